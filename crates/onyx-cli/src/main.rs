//! onyx command-line tool
//!
//! Offline helpers around the onyx wire formats: blinded ids, SOGS
//! request headers, V4 frame decoding and blinded id matching.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

use onyx_core::ClientConfig;
use onyx_crypto::{
    decode_hex_32, derive_blinded_id, try_match_blinded_with_standard, AccountKeyPair,
};
use onyx_protocol::sogs::{sign_request, SogsRequest};
use onyx_protocol::{decode_v4_response, V4Body};

/// onyx tools
#[derive(Parser, Debug)]
#[command(name = "onyx")]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ONYX_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Log format (plain, json)
    #[arg(long, env = "ONYX_LOG_FORMAT", default_value = "plain", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the `15` blinded id of an account on a server
    BlindedId {
        /// Account Ed25519 seed, hex
        #[arg(long, env = "ONYX_SEED")]
        seed: String,
        /// Server public key, hex
        #[arg(long)]
        server_pk: String,
    },

    /// Print the X-SOGS-* headers for a request, as JSON
    SignHeaders {
        /// Account Ed25519 seed, hex
        #[arg(long, env = "ONYX_SEED")]
        seed: String,
        /// Server public key, hex
        #[arg(long)]
        server_pk: String,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
        /// Endpoint, starting with `/`
        #[arg(long)]
        endpoint: String,
        /// Sign with the blinded key
        #[arg(long)]
        blinded: bool,
        /// Request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Decode a V4 response frame and print its meta and body
    DecodeFrame {
        /// Frame bytes, hex
        #[arg(long)]
        hex: String,
    },

    /// Check whether a `05` id and a blinded id are the same account on a server
    Match {
        /// Standard `05` id
        #[arg(long)]
        standard: String,
        /// Blinded `15`/`25` id
        #[arg(long)]
        blinded: String,
        /// Server public key, hex
        #[arg(long)]
        server_pk: String,
    },

    /// Print the default client configuration, as JSON
    Config,
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("reqwest=warn".parse()?);

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }

    Ok(())
}

fn server_key(hex: &str) -> Result<[u8; 32]> {
    decode_hex_32(hex).context("server public key must be 32 bytes of hex")
}

fn account(seed: &str) -> Result<AccountKeyPair> {
    AccountKeyPair::from_seed_hex(seed).context("seed must be 32 bytes of hex")
}

fn blinded_id(seed: &str, server_pk: &str) -> Result<String> {
    Ok(derive_blinded_id(&server_key(server_pk)?, &account(seed)?))
}

fn sign_headers(
    seed: &str,
    server_pk: &str,
    method: &str,
    endpoint: &str,
    blinded: bool,
    body: Option<&str>,
    now_ms: u64,
) -> Result<Value> {
    if !endpoint.starts_with('/') {
        bail!("endpoint needs a leading /");
    }
    let server_public_key = server_key(server_pk)?;
    let request = SogsRequest {
        server_public_key: &server_public_key,
        method,
        endpoint,
        body: body.map(str::as_bytes),
        blinded,
    };
    let headers = sign_request(&account(seed)?, &request, now_ms).to_headers();
    Ok(serde_json::to_value(headers)?)
}

fn decode_frame(hex_frame: &str) -> Result<Value> {
    let bytes = hex::decode(hex_frame.trim()).context("frame must be hex")?;
    let response = decode_v4_response(&bytes).context("not a V4 response frame")?;
    debug!(status = response.status_code(), "decoded frame");

    let body = match &response.body {
        V4Body::None => Value::Null,
        V4Body::Json(value) => value.clone(),
        V4Body::PlainText(text) | V4Body::Html(text) => json!(text),
        V4Body::Bytes(bytes) => json!(hex::encode(bytes)),
    };
    Ok(json!({ "meta": response.meta, "body": body }))
}

fn match_ids(standard: &str, blinded: &str, server_pk: &str) -> Result<bool> {
    Ok(try_match_blinded_with_standard(standard, blinded, &server_key(server_pk)?)?)
}

fn run(command: Command) -> Result<String> {
    match command {
        Command::BlindedId { seed, server_pk } => blinded_id(&seed, &server_pk),
        Command::SignHeaders {
            seed,
            server_pk,
            method,
            endpoint,
            blinded,
            body,
        } => {
            let now_ms = onyx_core::time::now_ms()?;
            let headers = sign_headers(
                &seed,
                &server_pk,
                &method.to_uppercase(),
                &endpoint,
                blinded,
                body.as_deref(),
                now_ms,
            )?;
            Ok(serde_json::to_string_pretty(&headers)?)
        }
        Command::DecodeFrame { hex } => Ok(serde_json::to_string_pretty(&decode_frame(&hex)?)?),
        Command::Match {
            standard,
            blinded,
            server_pk,
        } => Ok(match_ids(&standard, &blinded, &server_pk)?.to_string()),
        Command::Config => Ok(serde_json::to_string_pretty(&ClientConfig::default())?),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, &args.log_format)?;

    let output = run(args.command)?;
    println!("{output}");
    Ok(())
}

//! SOGS `/batch` and `/sequence` requests.
//!
//! Several operations are sent as one signed request. The server answers
//! with an array aligned with the subrequests: entry `i` belongs to
//! subrequest `i`. `/batch` runs every subrequest; `/sequence` stops at the
//! first failure, so later entries may be missing.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ProtocolError, Result};
use crate::limits::MESSAGE_REACTORS_LIMIT;
use crate::sogs::responses::{
    parse_typed, CapabilitiesResponse, InboxMessage, PollInfoResponse, RoomMessage,
};

/// How the server runs the subrequests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Independent subrequests.
    #[default]
    Batch,
    /// Stop at the first failing subrequest.
    Sequence,
}

impl BatchMode {
    /// Endpoint on the server.
    pub fn endpoint(&self) -> &'static str {
        match self {
            BatchMode::Batch => "/batch",
            BatchMode::Sequence => "/sequence",
        }
    }
}

/// One operation in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRow {
    /// Server capabilities.
    Capabilities,
    /// New or recent room messages.
    Messages {
        /// Room token.
        room: String,
        /// Last seen seqno; `None` fetches recent messages.
        since_seqno: Option<u64>,
    },
    /// Room permissions and, when changed, details.
    PollInfo {
        /// Room token.
        room: String,
        /// Last seen `info_updates` counter.
        info_updates: u64,
    },
    /// Blinded direct messages to us.
    Inbox {
        /// Last seen inbox id.
        since_id: Option<u64>,
    },
    /// Blinded direct messages from us.
    Outbox {
        /// Last seen outbox id.
        since_id: Option<u64>,
    },
    /// Grant or revoke moderator/admin rights. Expands to one subrequest per id.
    AddRemoveModerators {
        /// Room token.
        room: String,
        /// Users to change.
        session_ids: Vec<String>,
        /// Admin rather than moderator.
        is_admin: bool,
        /// Publicly visible.
        visible: bool,
        /// Grant (`true`) or revoke.
        add: bool,
    },
    /// Ban or unban a user from a room.
    BanUnbanUser {
        /// Room token.
        room: String,
        /// User to change.
        session_id: String,
        /// Ban (`true`) or unban.
        ban: bool,
    },
    /// Delete every post of a user in a room.
    DeleteAllPosts {
        /// Room token.
        room: String,
        /// Author.
        session_id: String,
    },
    /// Delete one message.
    DeleteMessage {
        /// Room token.
        room: String,
        /// Server message id.
        message_id: u64,
    },
    /// Change the room image.
    UpdateRoom {
        /// Room token.
        room: String,
        /// Uploaded file id.
        image_id: u64,
    },
    /// Remove every reaction of one kind from a message.
    DeleteReaction {
        /// Room token.
        room: String,
        /// Server message id.
        message_id: u64,
        /// The reaction, usually an emoji.
        reaction: String,
    },
}

/// Kind of a [`BatchRow`], used to pair response entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchRowKind {
    /// See [`BatchRow::Capabilities`].
    Capabilities,
    /// See [`BatchRow::Messages`].
    Messages,
    /// See [`BatchRow::PollInfo`].
    PollInfo,
    /// See [`BatchRow::Inbox`].
    Inbox,
    /// See [`BatchRow::Outbox`].
    Outbox,
    /// See [`BatchRow::AddRemoveModerators`].
    AddRemoveModerators,
    /// See [`BatchRow::BanUnbanUser`].
    BanUnbanUser,
    /// See [`BatchRow::DeleteAllPosts`].
    DeleteAllPosts,
    /// See [`BatchRow::DeleteMessage`].
    DeleteMessage,
    /// See [`BatchRow::UpdateRoom`].
    UpdateRoom,
    /// See [`BatchRow::DeleteReaction`].
    DeleteReaction,
}

/// One subrequest as sent in the batch body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// HTTP method.
    pub method: String,
    /// Path and query.
    pub path: String,
    /// JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl SubRequest {
    fn new(method: &str, path: String) -> Self {
        Self {
            method: method.into(),
            path,
            json: None,
        }
    }

    fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }
}

impl BatchRow {
    /// The row's kind.
    pub fn kind(&self) -> BatchRowKind {
        match self {
            BatchRow::Capabilities => BatchRowKind::Capabilities,
            BatchRow::Messages { .. } => BatchRowKind::Messages,
            BatchRow::PollInfo { .. } => BatchRowKind::PollInfo,
            BatchRow::Inbox { .. } => BatchRowKind::Inbox,
            BatchRow::Outbox { .. } => BatchRowKind::Outbox,
            BatchRow::AddRemoveModerators { .. } => BatchRowKind::AddRemoveModerators,
            BatchRow::BanUnbanUser { .. } => BatchRowKind::BanUnbanUser,
            BatchRow::DeleteAllPosts { .. } => BatchRowKind::DeleteAllPosts,
            BatchRow::DeleteMessage { .. } => BatchRowKind::DeleteMessage,
            BatchRow::UpdateRoom { .. } => BatchRowKind::UpdateRoom,
            BatchRow::DeleteReaction { .. } => BatchRowKind::DeleteReaction,
        }
    }

    /// Room the row targets, if any.
    pub fn room(&self) -> Option<&str> {
        match self {
            BatchRow::Capabilities | BatchRow::Inbox { .. } | BatchRow::Outbox { .. } => None,
            BatchRow::Messages { room, .. }
            | BatchRow::PollInfo { room, .. }
            | BatchRow::AddRemoveModerators { room, .. }
            | BatchRow::BanUnbanUser { room, .. }
            | BatchRow::DeleteAllPosts { room, .. }
            | BatchRow::DeleteMessage { room, .. }
            | BatchRow::UpdateRoom { room, .. }
            | BatchRow::DeleteReaction { room, .. } => Some(room),
        }
    }

    /// Subrequests for this row.
    pub fn subrequests(&self) -> Vec<SubRequest> {
        match self {
            BatchRow::Capabilities => vec![SubRequest::new("GET", "/capabilities".into())],
            BatchRow::Messages { room, since_seqno } => {
                let path = match since_seqno {
                    Some(seqno) => format!(
                        "/room/{room}/messages/since/{seqno}?t=r&reactors={MESSAGE_REACTORS_LIMIT}"
                    ),
                    None => format!("/room/{room}/messages/recent?reactors={MESSAGE_REACTORS_LIMIT}"),
                };
                vec![SubRequest::new("GET", path)]
            }
            BatchRow::PollInfo { room, info_updates } => vec![SubRequest::new(
                "GET",
                format!("/room/{room}/pollInfo/{info_updates}"),
            )],
            BatchRow::Inbox { since_id } => vec![SubRequest::new("GET", box_path("inbox", *since_id))],
            BatchRow::Outbox { since_id } => {
                vec![SubRequest::new("GET", box_path("outbox", *since_id))]
            }
            BatchRow::AddRemoveModerators {
                room,
                session_ids,
                is_admin,
                visible,
                add,
            } => session_ids
                .iter()
                .map(|id| {
                    let role = if *is_admin { "admin" } else { "moderator" };
                    let mut body = json!({ "rooms": [room], "global": false, "visible": visible });
                    body[role] = json!(add);
                    SubRequest::new("POST", format!("/user/{id}/moderator")).with_json(body)
                })
                .collect(),
            BatchRow::BanUnbanUser {
                room,
                session_id,
                ban,
            } => {
                let action = if *ban { "ban" } else { "unban" };
                vec![SubRequest::new("POST", format!("/user/{session_id}/{action}"))
                    .with_json(json!({ "rooms": [room] }))]
            }
            BatchRow::DeleteAllPosts { room, session_id } => vec![SubRequest::new(
                "DELETE",
                format!("/room/{room}/all/{session_id}"),
            )],
            BatchRow::DeleteMessage { room, message_id } => vec![SubRequest::new(
                "DELETE",
                format!("/room/{room}/message/{message_id}"),
            )],
            BatchRow::UpdateRoom { room, image_id } => {
                vec![SubRequest::new("PUT", format!("/room/{room}"))
                    .with_json(json!({ "image": image_id }))]
            }
            BatchRow::DeleteReaction {
                room,
                message_id,
                reaction,
            } => vec![SubRequest::new(
                "DELETE",
                format!(
                    "/room/{room}/reactions/{message_id}/{}",
                    encode_path_segment(reaction)
                ),
            )],
        }
    }
}

fn box_path(name: &str, since_id: Option<u64>) -> String {
    match since_id {
        Some(id) => format!("/{name}/since/{id}"),
        None => format!("/{name}"),
    }
}

/// Everything outside the RFC 3986 unreserved set.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Expand rows into `(kind, subrequest)` pairs in wire order.
pub fn expand_rows(rows: &[BatchRow]) -> Vec<(BatchRowKind, SubRequest)> {
    rows.iter()
        .flat_map(|row| {
            let kind = row.kind();
            row.subrequests().into_iter().map(move |sub| (kind, sub))
        })
        .collect()
}

/// JSON body for `/batch` or `/sequence`.
pub fn build_batch_body(rows: &[BatchRow]) -> Result<Vec<u8>> {
    let subrequests: Vec<SubRequest> = expand_rows(rows).into_iter().map(|(_, sub)| sub).collect();
    Ok(serde_json::to_vec(&subrequests)?)
}

/// One raw entry of the response array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchEntry {
    /// HTTP status of the subrequest.
    pub code: u16,
    /// Subrequest response headers.
    #[serde(default)]
    pub headers: Value,
    /// Subrequest response body.
    #[serde(default)]
    pub body: Value,
}

/// A validated subresponse body.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchBody {
    /// Capabilities.
    Capabilities(CapabilitiesResponse),
    /// Room poll info.
    PollInfo(PollInfoResponse),
    /// Room messages.
    Messages(Vec<RoomMessage>),
    /// Inbox messages.
    Inbox(Vec<InboxMessage>),
    /// Outbox messages.
    Outbox(Vec<InboxMessage>),
    /// Moderation operations carry no body we use.
    Acknowledged,
    /// Non-2xx status; the body was not validated.
    Unavailable,
}

/// A subresponse paired with the kind of its subrequest.
#[derive(Debug)]
pub struct BatchSubResponse {
    /// Kind of the subrequest at this index.
    pub kind: BatchRowKind,
    /// HTTP status.
    pub code: u16,
    /// Validated body, or the schema error for this entry.
    pub body: Result<BatchBody>,
}

/// A demultiplexed batch response.
#[derive(Debug)]
pub struct BatchResponse {
    /// Capabilities, extracted before anything else.
    pub capabilities: Option<CapabilitiesResponse>,
    /// One entry per received subresponse, in subrequest order.
    pub entries: Vec<BatchSubResponse>,
}

/// Pair the response array with `rows` by index and validate each entry.
///
/// # Errors
///
/// Returns `Framing` if `body` is not an array, holds more entries than
/// there were subrequests, or an entry lacks a status code. Per-entry
/// schema failures are reported in [`BatchSubResponse::body`].
pub fn demux_batch_response(rows: &[BatchRow], body: &Value) -> Result<BatchResponse> {
    let raw = body
        .as_array()
        .ok_or_else(|| ProtocolError::framing("batch response is not an array"))?;
    let kinds: Vec<BatchRowKind> = expand_rows(rows).into_iter().map(|(kind, _)| kind).collect();
    if raw.len() > kinds.len() {
        return Err(ProtocolError::framing(format!(
            "batch response has {} entries for {} subrequests",
            raw.len(),
            kinds.len()
        )));
    }

    let entries = raw
        .iter()
        .map(|value| {
            BatchEntry::deserialize(value)
                .map_err(|e| ProtocolError::framing(format!("invalid batch entry: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let capabilities = kinds
        .iter()
        .zip(&entries)
        .find(|(kind, entry)| **kind == BatchRowKind::Capabilities && is_success(entry.code))
        .and_then(|(_, entry)| parse_typed::<CapabilitiesResponse>("capabilities", &entry.body).ok());

    let entries = kinds
        .into_iter()
        .zip(entries)
        .map(|(kind, entry)| BatchSubResponse {
            kind,
            code: entry.code,
            body: validate_entry(kind, &entry),
        })
        .collect();

    Ok(BatchResponse {
        capabilities,
        entries,
    })
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn list_or_empty<T: serde::de::DeserializeOwned>(kind: &str, body: &Value) -> Result<Vec<T>> {
    if body.is_null() {
        return Ok(Vec::new());
    }
    parse_typed(kind, body)
}

fn validate_entry(kind: BatchRowKind, entry: &BatchEntry) -> Result<BatchBody> {
    if !is_success(entry.code) {
        return Ok(BatchBody::Unavailable);
    }
    match kind {
        BatchRowKind::Capabilities => {
            parse_typed("capabilities", &entry.body).map(BatchBody::Capabilities)
        }
        BatchRowKind::PollInfo => parse_typed("pollInfo", &entry.body).map(BatchBody::PollInfo),
        BatchRowKind::Messages => list_or_empty("messages", &entry.body).map(BatchBody::Messages),
        BatchRowKind::Inbox => list_or_empty("inbox", &entry.body).map(BatchBody::Inbox),
        BatchRowKind::Outbox => list_or_empty("outbox", &entry.body).map(BatchBody::Outbox),
        BatchRowKind::AddRemoveModerators
        | BatchRowKind::BanUnbanUser
        | BatchRowKind::DeleteAllPosts
        | BatchRowKind::DeleteMessage
        | BatchRowKind::UpdateRoom
        | BatchRowKind::DeleteReaction => Ok(BatchBody::Acknowledged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(row: &BatchRow) -> Vec<(String, String)> {
        row.subrequests()
            .into_iter()
            .map(|s| (s.method, s.path))
            .collect()
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            paths(&BatchRow::Capabilities),
            vec![("GET".into(), "/capabilities".into())]
        );
        assert_eq!(
            paths(&BatchRow::Messages { room: "r".into(), since_seqno: Some(7) }),
            vec![("GET".into(), "/room/r/messages/since/7?t=r&reactors=5".into())]
        );
        assert_eq!(
            paths(&BatchRow::Messages { room: "r".into(), since_seqno: None }),
            vec![("GET".into(), "/room/r/messages/recent?reactors=5".into())]
        );
        assert_eq!(
            paths(&BatchRow::PollInfo { room: "r".into(), info_updates: 3 }),
            vec![("GET".into(), "/room/r/pollInfo/3".into())]
        );
        assert_eq!(
            paths(&BatchRow::Inbox { since_id: Some(4) }),
            vec![("GET".into(), "/inbox/since/4".into())]
        );
        assert_eq!(
            paths(&BatchRow::Outbox { since_id: None }),
            vec![("GET".into(), "/outbox".into())]
        );
        assert_eq!(
            paths(&BatchRow::DeleteAllPosts { room: "r".into(), session_id: "05ab".into() }),
            vec![("DELETE".into(), "/room/r/all/05ab".into())]
        );
        assert_eq!(
            paths(&BatchRow::DeleteMessage { room: "r".into(), message_id: 11 }),
            vec![("DELETE".into(), "/room/r/message/11".into())]
        );
    }

    #[test]
    fn test_moderators_one_per_id() {
        let row = BatchRow::AddRemoveModerators {
            room: "r".into(),
            session_ids: vec!["05aa".into(), "05bb".into()],
            is_admin: true,
            visible: false,
            add: true,
        };
        let subs = row.subrequests();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].path, "/user/05bb/moderator");
        assert_eq!(
            subs[0].json,
            Some(json!({"rooms": ["r"], "global": false, "visible": false, "admin": true}))
        );
    }

    #[test]
    fn test_ban_and_update_bodies() {
        let ban = BatchRow::BanUnbanUser { room: "r".into(), session_id: "05aa".into(), ban: false };
        let sub = &ban.subrequests()[0];
        assert_eq!(sub.path, "/user/05aa/unban");
        assert_eq!(sub.json, Some(json!({"rooms": ["r"]})));

        let update = BatchRow::UpdateRoom { room: "r".into(), image_id: 99 };
        let sub = &update.subrequests()[0];
        assert_eq!(sub.method, "PUT");
        assert_eq!(sub.json, Some(json!({"image": 99})));
    }

    #[test]
    fn test_reaction_is_percent_encoded() {
        let row = BatchRow::DeleteReaction {
            room: "r".into(),
            message_id: 5,
            reaction: "👍".into(),
        };
        assert_eq!(row.subrequests()[0].path, "/room/r/reactions/5/%F0%9F%91%8D");

        let row = BatchRow::DeleteReaction {
            room: "r".into(),
            message_id: 5,
            reaction: "a b/c?-_.~".into(),
        };
        assert_eq!(row.subrequests()[0].path, "/room/r/reactions/5/a%20b%2Fc%3F-_.~");
    }

    #[test]
    fn test_batch_body_omits_missing_json() {
        let body = build_batch_body(&[BatchRow::Capabilities]).unwrap();
        assert_eq!(body, br#"[{"method":"GET","path":"/capabilities"}]"#);
        assert_eq!(BatchMode::Sequence.endpoint(), "/sequence");
    }

    #[test]
    fn test_demux_is_positional() {
        let rows = vec![
            BatchRow::PollInfo { room: "r".into(), info_updates: 0 },
            BatchRow::Capabilities,
            BatchRow::Inbox { since_id: None },
        ];
        let response = json!([
            {"code": 200, "body": {"token": "r", "active_users": 2, "read": true, "write": true, "upload": true}},
            {"code": 200, "body": {"capabilities": ["sogs", "blind"]}},
            {"code": 200, "body": [{"id": 1, "sender": "15aa", "recipient": "15bb", "posted_at": 1.5, "message": "AA=="}]}
        ]);

        let demuxed = demux_batch_response(&rows, &response).unwrap();
        assert!(demuxed.capabilities.unwrap().requires_blinding());
        assert_eq!(demuxed.entries.len(), 3);
        assert_eq!(demuxed.entries[0].kind, BatchRowKind::PollInfo);
        assert!(matches!(demuxed.entries[0].body, Ok(BatchBody::PollInfo(_))));
        assert!(matches!(demuxed.entries[1].body, Ok(BatchBody::Capabilities(_))));
        match &demuxed.entries[2].body {
            Ok(BatchBody::Inbox(messages)) => assert_eq!(messages[0].id, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_demux_schema_failure_is_per_entry() {
        let rows = vec![BatchRow::PollInfo { room: "r".into(), info_updates: 0 }, BatchRow::Capabilities];
        let response = json!([
            {"code": 200, "body": {"nonsense": true}},
            {"code": 200, "body": {"capabilities": []}}
        ]);
        let demuxed = demux_batch_response(&rows, &response).unwrap();
        assert!(matches!(demuxed.entries[0].body, Err(ProtocolError::Framing(_))));
        assert!(demuxed.entries[1].body.is_ok());
    }

    #[test]
    fn test_demux_sequence_may_be_short() {
        let rows = vec![
            BatchRow::DeleteMessage { room: "r".into(), message_id: 1 },
            BatchRow::DeleteMessage { room: "r".into(), message_id: 2 },
        ];
        let demuxed = demux_batch_response(&rows, &json!([{"code": 403}])).unwrap();
        assert_eq!(demuxed.entries.len(), 1);
        assert!(matches!(demuxed.entries[0].body, Ok(BatchBody::Unavailable)));
    }

    #[test]
    fn test_demux_rejects_extra_entries_and_non_array() {
        let rows = vec![BatchRow::Capabilities];
        assert!(demux_batch_response(&rows, &json!([{"code": 200}, {"code": 200}])).is_err());
        assert!(demux_batch_response(&rows, &json!({"code": 200})).is_err());
    }

    #[test]
    fn test_null_inbox_is_empty() {
        let rows = vec![BatchRow::Outbox { since_id: Some(3) }];
        let demuxed = demux_batch_response(&rows, &json!([{"code": 200, "body": null}])).unwrap();
        assert!(matches!(&demuxed.entries[0].body, Ok(BatchBody::Outbox(m)) if m.is_empty()));
    }
}

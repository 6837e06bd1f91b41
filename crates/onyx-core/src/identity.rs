//! Account identity provider.

use std::sync::{Arc, RwLock};

use onyx_crypto::AccountKeyPair;

/// Source of the account keys used to sign requests and decrypt inboxes.
pub trait IdentityProvider: Send + Sync {
    /// The current account, if one is loaded.
    fn account(&self) -> Option<Arc<AccountKeyPair>>;
}

/// An identity that can be set, replaced or cleared at runtime.
#[derive(Default)]
pub struct StaticIdentity {
    account: RwLock<Option<Arc<AccountKeyPair>>>,
}

impl std::fmt::Debug for StaticIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentity")
            .field("loaded", &self.account().is_some())
            .finish()
    }
}

impl StaticIdentity {
    /// No account loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an account.
    pub fn new(account: AccountKeyPair) -> Self {
        Self {
            account: RwLock::new(Some(Arc::new(account))),
        }
    }

    /// Replace the account.
    pub fn set(&self, account: AccountKeyPair) {
        if let Ok(mut guard) = self.account.write() {
            *guard = Some(Arc::new(account));
        }
    }

    /// Forget the account.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.account.write() {
            *guard = None;
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn account(&self) -> Option<Arc<AccountKeyPair>> {
        self.account.read().ok().and_then(|guard| guard.clone())
    }
}

//! Session identity shared with the presence subsystem.
//!
//! Authentication itself is out of scope here: some outer login flow
//! obtains a user id and bearer token and publishes them through an
//! [`IdentityStore`]. Presence components only ever read the store, via
//! a `watch` channel whose `None` state means "logged out".

use tokio::sync::watch;
use tracing::debug;

/// The logged-in user's id and bearer token. Read-only for the presence
/// subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

/// Owner side of the session identity. One per logged-in account;
/// created at app start and torn down with it, not tied to any screen.
#[derive(Debug)]
pub struct IdentityStore {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Publish a fresh identity after login. Watchers observe the change.
    pub fn set(&self, identity: Identity) {
        debug!(user_id = %identity.user_id, "session identity set");
        self.tx.send_replace(Some(identity));
    }

    /// Drop the identity on logout. Watchers observe the change.
    pub fn clear(&self) {
        debug!("session identity cleared");
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Subscribe to identity changes. The receiver's current value is the
    /// identity at subscription time.
    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

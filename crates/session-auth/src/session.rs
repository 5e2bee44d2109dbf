//! In-memory session store
//!
//! Holds the current access token and the authenticated identity. Reads are
//! cheap and synchronous so credential attachment never awaits. Every
//! `clear()` is broadcast as a `SessionEvent::Cleared` so the surrounding
//! application can drop caches and send the user back to sign-in.
//!
//! After a clear the store is *signed out*: the refresh coordinator will not
//! try to revive the session until a login installs a new token.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the session event channel. Subscribers that fall further
/// behind than this see `RecvError::Lagged` and should resync from the store.
const EVENT_CAPACITY: usize = 16;

/// Authenticated user as returned by the login/refresh endpoints.
///
/// The pipeline never interprets the identity beyond a couple of
/// convenience accessors, so it is kept as the raw JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(serde_json::Value);

impl Identity {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// User id (`_id` as sent by the API, or `id`).
    pub fn id(&self) -> Option<&str> {
        self.0
            .get("_id")
            .or_else(|| self.0.get("id"))
            .and_then(|v| v.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(|v| v.as_str())
    }
}

/// Why the session was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The user (or the relay's logout route) signed out explicitly
    Logout,
    /// The refresh endpoint rejected the refresh credential; forced sign-out
    RefreshRejected,
}

impl ClearReason {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ClearReason::Logout => "logout",
            ClearReason::RefreshRejected => "refresh_rejected",
        }
    }
}

/// Notifications published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new access token was installed (login or refresh)
    TokenUpdated,
    /// Token and identity were discarded
    Cleared(ClearReason),
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<Secret<String>>,
    user: Option<Identity>,
    signed_out: bool,
}

/// Current session: access token, identity, and signed-out flag.
#[derive(Debug)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Empty, not signed out. A cold start may still recover a session
    /// through the refresh cookie.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    /// Store seeded with an access token (e.g. from the relay's config).
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.write().access_token = Some(Secret::new(token.into()));
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn access_token(&self) -> Option<String> {
        self.read()
            .access_token
            .as_ref()
            .map(|token| token.expose().clone())
    }

    /// Install a new access token. Also lifts the signed-out flag.
    pub fn set_access_token(&self, token: impl Into<String>) {
        {
            let mut state = self.write();
            state.access_token = Some(Secret::new(token.into()));
            state.signed_out = false;
        }
        debug!("access token updated");
        let _ = self.events.send(SessionEvent::TokenUpdated);
    }

    pub fn user(&self) -> Option<Identity> {
        self.read().user.clone()
    }

    pub fn set_user(&self, identity: Identity) {
        debug!(user_id = identity.id().unwrap_or("<unknown>"), "identity updated");
        self.write().user = Some(identity);
    }

    /// Set or drop the identity. Used when a new sign-in replaces the
    /// session and its payload may not name a user.
    pub fn replace_user(&self, identity: Option<Identity>) {
        self.write().user = identity;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access_token.is_some()
    }

    /// True between a `clear()` and the next `set_access_token()`.
    pub fn is_signed_out(&self) -> bool {
        self.read().signed_out
    }

    /// Discard token and identity, mark the session signed out, and notify
    /// subscribers.
    pub fn clear(&self, reason: ClearReason) {
        let had_token = {
            let mut state = self.write();
            let had_token = state.access_token.is_some();
            state.access_token = None;
            state.user = None;
            state.signed_out = true;
            had_token
        };
        info!(reason = reason.label(), had_token, "session cleared");
        let _ = self.events.send(SessionEvent::Cleared(reason));
    }

    /// Subscribe to session events. Only events sent after this call are
    /// received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

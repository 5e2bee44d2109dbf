//! Error types for pipeline operations
//!
//! HTTP error statuses from the API are not errors here: they come back to
//! the caller as responses. These variants cover what the pipeline itself
//! could not do on the caller's behalf.

use std::time::Duration;

/// Errors from authenticated request execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("credential error: {0}")]
    Credentials(#[from] session_auth::Error),

    #[error("session ended: {0}")]
    LoggedOut(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("timed out after {0:?} waiting for token refresh")]
    RefreshWaitTimeout(Duration),

    #[error("login rejected with status {status}")]
    LoginRejected { status: u16, body: String },

    #[error("anti-forgery bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for session and credential handling

/// Errors from session state, credential attachment, and payload parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("malformed auth payload: {0}")]
    MalformedPayload(String),

    #[error("missing field in auth payload: {0}")]
    MissingField(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

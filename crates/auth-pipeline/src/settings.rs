//! Endpoint and header settings for the pipeline

use std::time::Duration;

use session_auth::{CSRF_HEADER, CSRF_MISMATCH_MARKER, CSRF_PATH, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};

/// Where the auth endpoints live and how anti-forgery failures are marked.
///
/// `refresh_wait` bounds how long any single caller waits for a refresh
/// outcome. It never cancels the refresh itself.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub refresh_path: String,
    pub csrf_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub csrf_header: String,
    pub csrf_marker: String,
    pub refresh_wait: Option<Duration>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            refresh_path: REFRESH_PATH.to_string(),
            csrf_path: CSRF_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
            logout_path: LOGOUT_PATH.to_string(),
            csrf_header: CSRF_HEADER.to_string(),
            csrf_marker: CSRF_MISMATCH_MARKER.to_string(),
            refresh_wait: None,
        }
    }
}

//! Endpoint paths and header names used by the meal-planner API
//!
//! Paths are relative to the API base URL. All of them can be overridden in
//! the relay's `[auth]` config section.

/// Refresh endpoint: POST with the refresh cookie, returns a new access token
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Anti-forgery bootstrap endpoint: GET, returns `{"csrfToken": "..."}`
pub const CSRF_PATH: &str = "/csrf-token";

/// Login endpoint: POST credentials, sets the refresh cookie
pub const LOGIN_PATH: &str = "/auth/login";

/// Logout endpoint: POST, revokes the refresh cookie server-side
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Header carrying the cached anti-forgery token
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Value the API puts in the `error` field of a 403 body when it rejected
/// the anti-forgery token (as opposed to a plain authorization denial).
pub const CSRF_MISMATCH_MARKER: &str = "CSRF_VALIDATION_FAILED";

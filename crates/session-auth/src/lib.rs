//! Session state and credential decoration for the meal-planner API
//!
//! Holds the pieces of the authenticated pipeline that never touch the
//! network: the session store (access token + identity), the anti-forgery
//! token cache, the credential attacher that decorates outgoing requests,
//! and parsers for the auth endpoints' JSON payloads.
//!
//! Ownership of mutation:
//! 1. Login flow calls `SessionStore::set_access_token()` + `set_user()`
//! 2. Refresh coordinator replaces the token after a successful refresh
//! 3. Refresh coordinator or logout flow calls `SessionStore::clear()`
//! 4. CSRF bootstrap replaces the `CsrfCache` value wholesale
//!
//! Everything else only reads.

pub mod attach;
pub mod constants;
pub mod csrf;
pub mod error;
pub mod payload;
pub mod session;

pub use attach::CredentialAttacher;
pub use constants::*;
pub use csrf::CsrfCache;
pub use error::{Error, Result};
pub use payload::{AuthPayload, parse_auth_payload, parse_csrf_payload};
pub use session::{ClearReason, Identity, SessionEvent, SessionStore};

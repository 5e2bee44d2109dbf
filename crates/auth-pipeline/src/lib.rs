//! Authenticated request pipeline for the meal-planner API
//!
//! Wraps every outbound call with credentials and recovers transparently from
//! an expired access token. However many requests hit a 401 at the same
//! time, exactly one refresh call goes out; everyone else waits for its
//! outcome and then replays their own request once.
//!
//! Request lifecycle:
//! 1. `AuthClient::execute()` waits out any refresh already in flight
//! 2. `CredentialAttacher` adds `Authorization` + anti-forgery headers
//! 3. `classify::dispatch_and_classify()` sends it and sorts the answer
//! 4. On `Unauthorized`, `RefreshCoordinator::refresh()` leads or joins the refresh
//! 5. Refresh hits a CSRF mismatch → `csrf::bootstrap()` then one more refresh
//! 6. On `Refreshed`, the original request is re-decorated and sent once more
//! 7. On `LoggedOut`, the session is already cleared and the caller gets an error

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod csrf;
pub mod error;
pub mod metrics;
pub mod settings;

#[cfg(test)]
mod testing;

pub use classify::{Classified, carries_csrf_marker, classify, dispatch_and_classify};
pub use client::AuthClient;
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use error::{Error, Result};
pub use settings::AuthSettings;

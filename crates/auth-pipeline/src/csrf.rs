//! Anti-forgery token bootstrap
//!
//! Only the refresh coordinator calls this, and only after the refresh
//! endpoint answered with a CSRF mismatch. The fetched value replaces the
//! cache wholesale; any failure leaves the cache empty so a stale value is
//! never replayed.

use session_auth::{CredentialAttacher, CsrfCache, parse_csrf_payload};
use tracing::{info, warn};
use transport::{Dispatcher, PendingRequest};

use crate::error::{Error, Result};
use crate::settings::AuthSettings;

/// Fetch a fresh anti-forgery token and cache it.
pub async fn bootstrap(
    dispatcher: &dyn Dispatcher,
    attacher: &CredentialAttacher,
    cache: &CsrfCache,
    settings: &AuthSettings,
) -> Result<()> {
    let result = fetch(dispatcher, attacher, settings).await;
    crate::metrics::record_bootstrap(result.is_ok());
    match result {
        Ok(token) => {
            cache.replace(token);
            info!(path = %settings.csrf_path, "anti-forgery token refreshed");
            Ok(())
        }
        Err(e) => {
            cache.clear();
            warn!(path = %settings.csrf_path, error = %e, "anti-forgery bootstrap failed");
            Err(e)
        }
    }
}

async fn fetch(
    dispatcher: &dyn Dispatcher,
    attacher: &CredentialAttacher,
    settings: &AuthSettings,
) -> Result<String> {
    let request = attacher.attach(&PendingRequest::get(settings.csrf_path.as_str()).with_credentials(true))?;
    let response = dispatcher
        .dispatch(&request)
        .await
        .map_err(|e| Error::Bootstrap(e.to_string()))?;
    if !response.status.is_success() {
        return Err(Error::Bootstrap(format!(
            "{} returned status {}",
            settings.csrf_path,
            response.status.as_u16()
        )));
    }
    parse_csrf_payload(&response.body).map_err(|e| Error::Bootstrap(e.to_string()))
}

//! Pipeline counters
//!
//! Recorded through the `metrics` facade; the host process decides where
//! they go (the relay installs a Prometheus recorder).
//!
//! - `auth_refresh_total` (counter): label `outcome` (`refreshed`, `logged_out`, `failed`)
//! - `auth_csrf_bootstrap_total` (counter): label `result` (`ok`, `error`)
//! - `auth_request_retries_total` (counter)

use crate::coordinator::RefreshOutcome;

/// Count one finished refresh network operation (leader only).
pub fn record_refresh(outcome: &RefreshOutcome) {
    ::metrics::counter!("auth_refresh_total", "outcome" => outcome.label()).increment(1);
}

pub fn record_bootstrap(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    ::metrics::counter!("auth_csrf_bootstrap_total", "result" => result).increment(1);
}

/// Count a request replayed after a successful refresh.
pub fn record_retry() {
    ::metrics::counter!("auth_request_retries_total").increment(1);
}

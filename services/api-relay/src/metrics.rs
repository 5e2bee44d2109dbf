//! Prometheus metrics exposition
//!
//! Relay metrics:
//!
//! - `relay_requests_total` (counter): labels `status`, `method`
//! - `relay_request_duration_seconds` (histogram): label `status`
//! - `relay_upstream_errors_total` (counter): label `error_type`
//! - `relay_session_cleared_total` (counter): label `reason`
//!
//! The pipeline's own `auth_*` counters land in the same recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 5ms to 60s, covering the configurable timeout
/// range plus a refresh round-trip.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("relay_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Explicit buckets make the duration render as a histogram (`_bucket`
/// lines) rather than the default summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed relay request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("relay_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record a request the relay had to answer itself.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("relay_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

pub fn record_session_cleared(reason: &str) {
    metrics::counter!("relay_session_cleared_total", "reason" => reason.to_string()).increment(1);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, "GET", 0.05);
        record_upstream_error("upstream_timeout");
        record_session_cleared("logout");
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.042);
        record_request(401, "POST", 1.5);

        let output = handle.render();
        assert!(output.contains("relay_requests_total"));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("status=\"401\""));
        assert!(output.contains("method=\"POST\""));
        assert!(
            output.contains("relay_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
    }

    #[test]
    fn error_and_session_counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("session_ended");
        record_upstream_error("upstream_timeout");
        record_session_cleared("refresh_rejected");

        let output = handle.render();
        assert!(output.contains("error_type=\"session_ended\""));
        assert!(output.contains("error_type=\"upstream_timeout\""));
        assert!(output.contains("relay_session_cleared_total{reason=\"refresh_rejected\"} 1"));
    }
}

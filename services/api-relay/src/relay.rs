//! HTTP relay logic
//!
//! Receives inbound requests, strips hop-by-hop and credential headers, and
//! hands them to the authenticated pipeline, which attaches the session's
//! own credentials. The upstream response comes back verbatim (including
//! error statuses) minus hop-by-hop headers and `set-cookie`: the session
//! cookie stays in the relay's jar.

use std::sync::atomic::Ordering;
use std::time::Instant;

use auth_pipeline::AuthClient;
use axum::response::Response;
use tracing::{debug, error, instrument, warn};
use transport::{HeaderMap, PendingRequest, RawResponse};

use crate::error::RelayError;
use crate::service::ServiceMetrics;

/// Headers to strip in both directions (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Inbound headers that would clash with what the relay sends on its own
/// behalf.
const INBOUND_STRIPPED: &[&str] = &["host", "authorization", "cookie", "content-length"];

/// Upstream headers never handed to local clients.
const OUTBOUND_STRIPPED: &[&str] = &["set-cookie"];

/// Largest inbound body the relay will buffer
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for the relay handler
#[derive(Clone)]
pub struct RelayState {
    pub client: AuthClient,
    pub metrics: ServiceMetrics,
}

/// Request id carried in logs and error bodies, e.g. `req_3f2a...`
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Relay one inbound request through the pipeline.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn relay_request(
    state: &RelayState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = state.metrics.track();
    let started = Instant::now();
    let method = request.method().to_string();

    let relayed = forward(state, request).await.and_then(|upstream| {
        debug!(status = upstream.status.as_u16(), "relayed");
        build_response(upstream)
    });

    let response = match relayed {
        Ok(response) => response,
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_upstream_error(e.error_type());
            if e.status().is_server_error() {
                error!(error = %e, error_type = e.error_type(), "relay failed");
            } else {
                warn!(error = %e, error_type = e.error_type(), "relay refused");
            }
            e.to_response(&request_id)
        }
    };

    crate::metrics::record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    state: &RelayState,
    request: axum::http::Request<axum::body::Body>,
) -> Result<RawResponse, RelayError> {
    let (parts, body) = request.into_parts();

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut headers = HeaderMap::new();
    for (name, value) in &parts.headers {
        if !is_hop_by_hop(name.as_str()) && !is_listed(INBOUND_STRIPPED, name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| RelayError::InvalidBody(e.to_string()))?;

    let pending = PendingRequest {
        method: parts.method,
        target,
        headers,
        body,
        send_credentials: true,
    };

    Ok(state.client.execute(&pending).await?)
}

fn build_response(upstream: RawResponse) -> Result<Response, RelayError> {
    let mut response = Response::builder().status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name.as_str()) && !is_listed(OUTBOUND_STRIPPED, name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(upstream.body))
        .map_err(|e| RelayError::ResponseBuild(e.to_string()))
}

fn is_listed(list: &[&str], name: &str) -> bool {
    list.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    is_listed(HOP_BY_HOP_HEADERS, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use transport::{HeaderValue, StatusCode as UpstreamStatus};

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("TRANSFER-ENCODING"));
        assert!(is_hop_by_hop("keep-alive"));
        assert!(is_hop_by_hop("Proxy-Authorization"));
        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("X-Custom-Header"));
    }

    #[test]
    fn credential_headers_are_stripped_inbound() {
        assert!(is_listed(INBOUND_STRIPPED, "Authorization"));
        assert!(is_listed(INBOUND_STRIPPED, "COOKIE"));
        assert!(is_listed(INBOUND_STRIPPED, "host"));
        assert!(!is_listed(INBOUND_STRIPPED, "accept-language"));
    }

    #[test]
    fn build_response_drops_set_cookie_and_hop_by_hop() {
        let mut upstream = RawResponse::new(UpstreamStatus::CREATED, r#"{"_id":"r1"}"#);
        upstream
            .headers
            .insert("set-cookie", HeaderValue::from_static("refreshToken=rt; HttpOnly"));
        upstream
            .headers
            .insert("connection", HeaderValue::from_static("close"));
        upstream
            .headers
            .insert("content-type", HeaderValue::from_static("application/json"));

        let response = build_response(upstream).unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("set-cookie").is_none());
        assert!(response.headers().get("connection").is_none());
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    }
}

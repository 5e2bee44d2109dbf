//! Response classification
//!
//! Every response the pipeline sees is sorted into exactly one bucket. Only
//! `Unauthorized` starts recovery, and only a `CsrfMismatch` on the refresh
//! call itself triggers the anti-forgery bootstrap.
//!
//! A 403 counts as `CsrfMismatch` only when its JSON body carries the
//! configured marker. A bare 403 is an ordinary authorization denial and is
//! passed through as `OtherError`.

use tracing::debug;
use transport::{Dispatcher, PendingRequest, RawResponse, StatusCode};

/// A response sorted by what the pipeline should do about it.
#[derive(Debug, Clone)]
pub enum Classified {
    /// 2xx, handed back unchanged
    Success(RawResponse),
    /// 401, the access token (or, on the refresh call, the refresh credential) was rejected
    Unauthorized(RawResponse),
    /// 403 with the anti-forgery marker
    CsrfMismatch(RawResponse),
    /// Anything else, never inspected for recovery
    OtherError(RawResponse),
}

impl Classified {
    /// Label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Classified::Success(_) => "success",
            Classified::Unauthorized(_) => "unauthorized",
            Classified::CsrfMismatch(_) => "csrf_mismatch",
            Classified::OtherError(_) => "other_error",
        }
    }

    pub fn response(&self) -> &RawResponse {
        match self {
            Classified::Success(r)
            | Classified::Unauthorized(r)
            | Classified::CsrfMismatch(r)
            | Classified::OtherError(r) => r,
        }
    }

    pub fn into_response(self) -> RawResponse {
        match self {
            Classified::Success(r)
            | Classified::Unauthorized(r)
            | Classified::CsrfMismatch(r)
            | Classified::OtherError(r) => r,
        }
    }
}

/// True if `body` is JSON whose `error`, `code`, or `error.code` field equals
/// `marker` exactly.
pub fn carries_csrf_marker(body: &[u8], marker: &str) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    let matches = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()) == Some(marker);
    matches(value.get("error"))
        || matches(value.get("code"))
        || matches(value.get("error").and_then(|e| e.get("code")))
}

/// Sort a response by status (and, for 403, by body marker).
pub fn classify(response: RawResponse, csrf_marker: &str) -> Classified {
    match response.status {
        s if s.is_success() => Classified::Success(response),
        StatusCode::UNAUTHORIZED => Classified::Unauthorized(response),
        StatusCode::FORBIDDEN if carries_csrf_marker(&response.body, csrf_marker) => {
            Classified::CsrfMismatch(response)
        }
        _ => Classified::OtherError(response),
    }
}

/// Send an already-decorated request and classify the answer.
///
/// Transport failures come back as `Err` and are never recovered here.
pub async fn dispatch_and_classify(
    dispatcher: &dyn Dispatcher,
    request: &PendingRequest,
    csrf_marker: &str,
) -> transport::Result<Classified> {
    let response = dispatcher.dispatch(request).await?;
    let classified = classify(response, csrf_marker);
    debug!(
        dispatcher = dispatcher.id(),
        method = %request.method,
        path = request.path(),
        status = classified.response().status.as_u16(),
        class = classified.label(),
        "response classified"
    );
    Ok(classified)
}

//! Request dispatcher abstraction for the meal-planner API
//!
//! Defines the `Dispatcher` trait that decouples the authenticated pipeline
//! from the HTTP client. The pipeline only ever sees `PendingRequest` in and
//! `RawResponse` out; TLS, pooling, and cookies are the dispatcher's concern.
//! `ReqwestDispatcher` is the production implementation; tests plug in
//! scripted fakes through the same trait.

pub mod reqwest_dispatcher;

pub use reqwest_dispatcher::ReqwestDispatcher;

pub use bytes::Bytes;
pub use reqwest::header;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};

use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// One logical API call, fully specified so it can be replayed verbatim.
///
/// `target` is either a path relative to the dispatcher's base URL
/// (`/recipes?page=2`) or an absolute URL. `send_credentials` asks the
/// dispatcher to attach ambient session credentials (the refresh cookie).
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub send_credentials: bool,
}

impl PendingRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            send_credentials: true,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// Replace (not append) a header value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body and set `content-type`.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .body(value.to_string())
    }

    pub fn with_credentials(mut self, send_credentials: bool) -> Self {
        self.send_credentials = send_credentials;
        self
    }

    /// Target path without the query string, for logging and metrics labels.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }
}

/// Response as returned by the dispatcher, before any classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily decoded. Used for logging and error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network-level failures. HTTP error statuses are not errors at this layer;
/// they come back as a `RawResponse`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response body read failed: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Short label for metrics and error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connection",
            TransportError::Body(_) => "body",
            TransportError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Abstraction over the HTTP transport.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Dispatcher>`), so the pipeline can hold any implementation.
pub trait Dispatcher: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "fake")
    fn id(&self) -> &str;

    /// Execute one request and return whatever the server answered.
    fn dispatch<'a>(
        &'a self,
        request: &'a PendingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_request_defaults_send_credentials() {
        let request = PendingRequest::get("/recipes");
        assert_eq!(request.method, Method::GET);
        assert!(request.send_credentials);
        assert!(request.body.is_empty());
        assert!(request.headers.is_empty());
    }

    #[test]
    fn header_replaces_existing_value() {
        let name = HeaderName::from_static("x-locale");
        let request = PendingRequest::get("/recipes")
            .header(name.clone(), HeaderValue::from_static("en"))
            .header(name.clone(), HeaderValue::from_static("ar"));
        let values: Vec<_> = request.headers.get_all(&name).iter().collect();
        assert_eq!(values, vec![HeaderValue::from_static("ar")]);
    }

    #[test]
    fn json_sets_content_type_and_body() {
        let request = PendingRequest::post("/meal-plans")
            .json(&serde_json::json!({"name": "week 12"}));
        assert_eq!(
            request.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["name"], "week 12");
    }

    #[test]
    fn path_strips_query_string() {
        assert_eq!(PendingRequest::get("/recipes?page=2").path(), "/recipes");
        assert_eq!(PendingRequest::get("/recipes").path(), "/recipes");
    }

    #[test]
    fn raw_response_decodes_json_and_text() {
        let response = RawResponse::new(StatusCode::OK, r#"{"csrfToken":"abc"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["csrfToken"], "abc");
        assert_eq!(response.text(), r#"{"csrfToken":"abc"}"#);
    }

    #[test]
    fn transport_error_kinds() {
        assert_eq!(TransportError::Timeout("x".into()).kind(), "timeout");
        assert_eq!(TransportError::Connect("x".into()).kind(), "connection");
        assert_eq!(TransportError::Body("x".into()).kind(), "body");
        assert_eq!(
            TransportError::InvalidRequest("x".into()).kind(),
            "invalid_request"
        );
    }
}

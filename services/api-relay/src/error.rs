//! Relay error responses
//!
//! Upstream HTTP error statuses are relayed verbatim and never become a
//! `RelayError`. These variants cover the cases where the relay itself has
//! to answer: the pipeline gave up, or the inbound request was unusable.

use auth_pipeline::Error as PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use transport::TransportError;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("response build error: {0}")]
    ResponseBuild(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Pipeline(e) => match e {
                PipelineError::LoggedOut(_) => StatusCode::UNAUTHORIZED,
                PipelineError::RefreshWaitTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Transport(TransportError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
                PipelineError::LoginRejected { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                PipelineError::Credentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Transport(_)
                | PipelineError::RefreshFailed(_)
                | PipelineError::Bootstrap(_) => StatusCode::BAD_GATEWAY,
            },
            RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RelayError::ResponseBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value of `error.type` in the JSON body, also the `error_type` metric label.
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Pipeline(e) => match e {
                PipelineError::LoggedOut(_) => "session_ended",
                PipelineError::RefreshFailed(_) | PipelineError::Bootstrap(_) => "refresh_failed",
                PipelineError::RefreshWaitTimeout(_) => "refresh_timeout",
                PipelineError::Transport(TransportError::Timeout(_)) => "upstream_timeout",
                PipelineError::Transport(_) => "upstream_error",
                PipelineError::LoginRejected { .. } => "login_rejected",
                PipelineError::Credentials(_) => "credential_error",
            },
            RelayError::InvalidBody(_) => "invalid_request",
            RelayError::ResponseBuild(_) => "relay_error",
        }
    }

    /// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
    pub fn to_response(&self, request_id: &str) -> Response {
        error_response(self.status(), self.error_type(), &self.to_string(), request_id)
    }
}

pub fn error_response(status: StatusCode, error_type: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

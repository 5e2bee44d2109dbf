//! Session management routes
//!
//! The relay's own sign-in surface. Local tools use these to start, seed,
//! inspect, and end the session the relay forwards with.
//!
//! Endpoints:
//! - GET  /session          session state and identity (never the token)
//! - POST /session/login    forward credentials to the API's login endpoint
//! - POST /session/token    install an access token obtained elsewhere
//! - POST /session/logout   end the session upstream and locally

use auth_pipeline::AuthClient;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use session_auth::Identity;
use tracing::{info, warn};
use transport::HeaderValue;

use crate::error::{RelayError, error_response};
use crate::relay::new_request_id;

/// Shared state for session handlers.
#[derive(Clone)]
pub struct SessionState {
    client: AuthClient,
}

impl SessionState {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }
}

pub fn build_session_router(state: SessionState) -> Router {
    Router::new()
        .route("/session", get(session_status))
        .route("/session/login", post(login))
        .route("/session/token", post(install_token))
        .route("/session/logout", post(logout))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// GET /session
async fn session_status(State(state): State<SessionState>) -> Response {
    let session = state.client.session();
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "authenticated": session.is_authenticated(),
            "signed_out": session.is_signed_out(),
            "refresh_in_flight": state.client.coordinator().is_refreshing(),
            "user": session.user().map(|u| u.as_value().clone()),
        }),
    )
}

/// POST /session/login — body is passed to the API's login endpoint as-is.
async fn login(
    State(state): State<SessionState>,
    axum::Json(credentials): axum::Json<serde_json::Value>,
) -> Response {
    match state.client.login(&credentials).await {
        Ok(user) => {
            info!(user_id = user.as_ref().and_then(|u| u.id()).unwrap_or("<unknown>"), "session started via login");
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "authenticated": true,
                    "user": user.map(|u| u.as_value().clone()),
                }),
            )
        }
        Err(e) => {
            let e = RelayError::from(e);
            warn!(error = %e, "login failed");
            e.to_response(&new_request_id())
        }
    }
}

#[derive(Deserialize)]
struct InstallTokenRequest {
    access_token: String,
    #[serde(default)]
    user: Option<Identity>,
}

/// POST /session/token — seed the session with a token obtained elsewhere.
///
/// Waits out an in-flight refresh first so a rejected refresh cannot clear
/// the token installed here.
async fn install_token(
    State(state): State<SessionState>,
    axum::Json(body): axum::Json<InstallTokenRequest>,
) -> Response {
    let token = body.access_token.trim();
    if token.is_empty() || HeaderValue::from_str(&format!("Bearer {token}")).is_err() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "access_token must be a non-empty header-safe string",
            &new_request_id(),
        );
    }

    if let Err(e) = state.client.coordinator().wait_idle().await {
        let e = RelayError::from(e);
        warn!(error = %e, "token install gave up waiting for refresh");
        return e.to_response(&new_request_id());
    }

    let session = state.client.session();
    session.replace_user(body.user);
    session.set_access_token(token);
    info!("access token installed");

    json_response(StatusCode::OK, serde_json::json!({ "authenticated": true }))
}

/// POST /session/logout — local state is cleared even if the API is
/// unreachable.
async fn logout(State(state): State<SessionState>) -> Response {
    match state.client.logout().await {
        Ok(upstream) => json_response(
            StatusCode::OK,
            serde_json::json!({
                "signed_out": true,
                "upstream_status": upstream.status.as_u16(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "upstream logout failed, session cleared locally");
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "signed_out": true,
                    "upstream_status": null,
                    "upstream_error": e.to_string(),
                }),
            )
        }
    }
}

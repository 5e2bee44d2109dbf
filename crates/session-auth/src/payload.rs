//! JSON payloads of the auth endpoints
//!
//! Login and refresh both answer with the API's standard envelope:
//!
//! ```json
//! {"success": true, "data": {"accessToken": "...", "user": {...}}}
//! ```
//!
//! The anti-forgery endpoint answers `{"csrfToken": "..."}`.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::session::Identity;

/// Token and identity carried by a login or refresh response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<Identity>,
}

#[derive(Deserialize)]
struct Envelope {
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfPayload {
    csrf_token: Option<String>,
}

/// Extract `data.accessToken` (required, non-empty) and `data.user`
/// (optional) from a login/refresh response body.
pub fn parse_auth_payload(body: &[u8]) -> Result<AuthPayload> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedPayload(format!("auth response is not JSON: {e}")))?;
    let data = envelope
        .data
        .ok_or_else(|| Error::MissingField("data".into()))?;
    if data.get("accessToken").is_none() {
        return Err(Error::MissingField("data.accessToken".into()));
    }
    let payload: AuthPayload = serde_json::from_value(data)
        .map_err(|e| Error::MalformedPayload(format!("invalid auth data: {e}")))?;
    if payload.access_token.is_empty() {
        return Err(Error::MissingField("data.accessToken".into()));
    }
    Ok(payload)
}

/// Extract `csrfToken` (required, non-empty) from the bootstrap response.
pub fn parse_csrf_payload(body: &[u8]) -> Result<String> {
    let payload: CsrfPayload = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedPayload(format!("csrf response is not JSON: {e}")))?;
    payload
        .csrf_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::MissingField("csrfToken".into()))
}

//! reqwest-backed dispatcher with a credential-scoped cookie jar.
//!
//! The refresh endpoint authenticates with an HTTP-only cookie set at login.
//! The jar is consulted and updated only for requests that ask for
//! credentials, so a request built with `with_credentials(false)` never
//! carries or overwrites the session cookie.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, SET_COOKIE};
use tracing::debug;

use crate::{Dispatcher, PendingRequest, RawResponse, Result, TransportError};
use std::future::Future;
use std::pin::Pin;

/// Production dispatcher: resolves targets against `base_url` and applies a
/// per-request timeout.
pub struct ReqwestDispatcher {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    jar: Arc<Jar>,
}

impl ReqwestDispatcher {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid base url {base_url}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            timeout,
            jar: Arc::new(Jar::default()),
        })
    }

    /// Cookie jar holding ambient session credentials.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Resolve a request target to an absolute URL.
    ///
    /// Absolute http(s) targets are used as-is; anything else is appended to
    /// the base URL path.
    pub fn resolve(&self, target: &str) -> Result<Url> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Url::parse(target)
                .map_err(|e| TransportError::InvalidRequest(format!("invalid target {target}: {e}")));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if target.starts_with('/') {
            format!("{base}{target}")
        } else {
            format!("{base}/{target}")
        };
        Url::parse(&joined)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid target {target}: {e}")))
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}

impl Dispatcher for ReqwestDispatcher {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn dispatch<'a>(
        &'a self,
        request: &'a PendingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.resolve(&request.target)?;

            let mut headers = request.headers.clone();
            if request.send_credentials {
                if let Some(cookie) = self.jar.cookies(&url) {
                    headers.insert(COOKIE, cookie);
                }
            } else {
                headers.remove(COOKIE);
            }

            debug!(method = %request.method, path = request.path(), "dispatching request");

            let response = self
                .client
                .request(request.method.clone(), url.clone())
                .headers(headers)
                .timeout(self.timeout)
                .body(request.body.clone())
                .send()
                .await
                .map_err(map_send_error)?;

            let status = response.status();
            let headers = response.headers().clone();

            if request.send_credentials {
                let mut set_cookies = headers.get_all(SET_COOKIE).iter();
                self.jar.set_cookies(&mut set_cookies, &url);
            }

            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            debug!(status = status.as_u16(), path = request.path(), "response received");

            Ok(RawResponse {
                status,
                headers,
                body,
            })
        })
    }
}

//! Credential attachment
//!
//! Decorates an outgoing request with `Authorization: Bearer <token>` and the
//! anti-forgery header, reading whatever the session store and CSRF cache
//! hold at call time. Values are inserted (replacing), so decorating the same
//! request twice, or re-decorating it for a retry after a refresh, yields
//! exactly one header of each kind carrying the current values.

use std::sync::Arc;

use transport::{HeaderName, HeaderValue, PendingRequest, header};

use crate::csrf::CsrfCache;
use crate::error::{Error, Result};
use crate::session::SessionStore;

#[derive(Debug, Clone)]
pub struct CredentialAttacher {
    session: Arc<SessionStore>,
    csrf: Arc<CsrfCache>,
    csrf_header: HeaderName,
}

impl CredentialAttacher {
    /// `csrf_header` is validated here so `attach` cannot fail on it later.
    pub fn new(session: Arc<SessionStore>, csrf: Arc<CsrfCache>, csrf_header: &str) -> Result<Self> {
        let csrf_header = HeaderName::from_bytes(csrf_header.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{csrf_header}: {e}")))?;
        Ok(Self {
            session,
            csrf,
            csrf_header,
        })
    }

    pub fn csrf_header(&self) -> &HeaderName {
        &self.csrf_header
    }

    /// Return a decorated copy of `request`. The original is untouched.
    ///
    /// Fails only if a stored token contains bytes that are not legal in a
    /// header value.
    pub fn attach(&self, request: &PendingRequest) -> Result<PendingRequest> {
        let mut decorated = request.clone();

        if let Some(token) = self.session.access_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidHeader(format!("access token: {e}")))?;
            value.set_sensitive(true);
            decorated.headers.insert(header::AUTHORIZATION, value);
        }

        if let Some(csrf) = self.csrf.get() {
            let mut value = HeaderValue::from_str(&csrf)
                .map_err(|e| Error::InvalidHeader(format!("anti-forgery token: {e}")))?;
            value.set_sensitive(true);
            decorated.headers.insert(self.csrf_header.clone(), value);
        }

        Ok(decorated)
    }
}

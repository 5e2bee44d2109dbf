//! Anti-forgery token cache
//!
//! One value per pipeline, shared by every request flow. The value is only
//! ever replaced as a whole (by the CSRF bootstrap) or dropped (on logout).

use std::sync::{PoisonError, RwLock};

use common::Secret;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CsrfCache {
    value: RwLock<Option<Secret<String>>>,
}

impl CsrfCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cached token, if any.
    pub fn get(&self) -> Option<String> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| token.expose().clone())
    }

    /// Replace the cached token.
    pub fn replace(&self, token: impl Into<String>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Secret::new(token.into()));
        debug!("anti-forgery token replaced");
    }

    pub fn clear(&self) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

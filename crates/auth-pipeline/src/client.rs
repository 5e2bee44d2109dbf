//! Authenticated API client
//!
//! `AuthClient::execute` is the whole pipeline for one logical request:
//! wait out an in-flight refresh, decorate, dispatch, and on a 401 lead or
//! join the shared refresh and replay the request exactly once. Whatever the
//! replay returns is final, so no request is ever sent more than twice.

use std::sync::Arc;

use session_auth::{ClearReason, CsrfCache, Identity, SessionStore, parse_auth_payload};
use tracing::{debug, info};
use transport::{Dispatcher, PendingRequest, RawResponse};

use crate::classify::{Classified, dispatch_and_classify};
use crate::coordinator::{RefreshCoordinator, RefreshOutcome};
use crate::error::{Error, Result};
use crate::settings::AuthSettings;

/// Entry point for every call to the API. Cheap to clone; clones share the
/// session, the anti-forgery cache, and the refresh slot.
#[derive(Clone)]
pub struct AuthClient {
    dispatcher: Arc<dyn Dispatcher>,
    session: Arc<SessionStore>,
    csrf: Arc<CsrfCache>,
    coordinator: RefreshCoordinator,
    settings: Arc<AuthSettings>,
}

impl AuthClient {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, session: Arc<SessionStore>, settings: AuthSettings) -> Result<Self> {
        let csrf = Arc::new(CsrfCache::new());
        let coordinator =
            RefreshCoordinator::new(dispatcher.clone(), session.clone(), csrf.clone(), settings.clone())?;
        Ok(Self {
            dispatcher,
            session,
            csrf,
            coordinator,
            settings: Arc::new(settings),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn csrf_cache(&self) -> &Arc<CsrfCache> {
        &self.csrf
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Run one logical request through the pipeline.
    ///
    /// HTTP error statuses come back as `Ok` responses. `Err` means the
    /// pipeline gave up: transport failure, the session ended, or the
    /// refresh could not complete.
    pub async fn execute(&self, request: &PendingRequest) -> Result<RawResponse> {
        self.coordinator.wait_idle().await?;

        let response = match self.send(request).await? {
            Classified::Unauthorized(_) => {
                debug!(method = %request.method, path = request.path(), "access token rejected, refreshing");
                match self.coordinator.refresh().await? {
                    RefreshOutcome::Refreshed => {
                        crate::metrics::record_retry();
                        debug!(method = %request.method, path = request.path(), "replaying request after refresh");
                        self.send(request).await?.into_response()
                    }
                    RefreshOutcome::LoggedOut => {
                        return Err(Error::LoggedOut(format!(
                            "{} {} needs a new sign-in",
                            request.method,
                            request.path()
                        )));
                    }
                    RefreshOutcome::Failed(reason) => return Err(Error::RefreshFailed(reason)),
                }
            }
            other => other.into_response(),
        };
        Ok(response)
    }

    /// Sign in with the given credentials body and install the session.
    ///
    /// Goes around the refresh path: a 401 here means bad credentials. A
    /// refresh already in flight settles first, so its outcome cannot
    /// overwrite the new session.
    pub async fn login(&self, credentials: &serde_json::Value) -> Result<Option<Identity>> {
        self.coordinator.wait_idle().await?;
        let request = PendingRequest::post(self.settings.login_path.as_str())
            .json(credentials)
            .with_credentials(true);
        let response = self.send(&request).await?.into_response();
        if !response.status.is_success() {
            return Err(Error::LoginRejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        let payload = parse_auth_payload(&response.body)?;
        self.session.replace_user(payload.user.clone());
        self.session.set_access_token(payload.access_token);
        info!(
            user_id = payload.user.as_ref().and_then(|u| u.id()).unwrap_or("<unknown>"),
            "signed in"
        );
        Ok(payload.user)
    }

    /// Tell the API to end the session, then clear local state whatever it
    /// answered.
    pub async fn logout(&self) -> Result<RawResponse> {
        let request = PendingRequest::post(self.settings.logout_path.as_str()).with_credentials(true);
        let result = self.execute(&request).await;
        self.session.clear(ClearReason::Logout);
        self.csrf.clear();
        result
    }

    async fn send(&self, request: &PendingRequest) -> Result<Classified> {
        let decorated = self.coordinator.attacher().attach(request)?;
        Ok(dispatch_and_classify(self.dispatcher.as_ref(), &decorated, &self.settings.csrf_marker).await?)
    }
}

//! Single-flight token refresh
//!
//! The coordinator owns one in-flight slot. The first caller to find it empty
//! becomes the leader: it installs a fresh outcome channel and spawns the
//! refresh operation on its own task. Everyone arriving while the slot is
//! occupied subscribes to that channel and sends nothing. The refresh task
//! writes the session, clears the slot, then publishes the outcome.
//!
//! Because the refresh runs on a spawned task, a leader that is cancelled or
//! times out mid-wait cannot strand the slot; only the refresh task (or its
//! drop guard, if it dies) releases it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use session_auth::{ClearReason, CredentialAttacher, CsrfCache, SessionStore, parse_auth_payload};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use transport::{Dispatcher, PendingRequest};

use crate::classify::{Classified, dispatch_and_classify};
use crate::error::{Error, Result};
use crate::settings::AuthSettings;

/// What a refresh attempt settled on. Every waiter on the same attempt
/// receives the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token is in the session store
    Refreshed,
    /// The refresh credential was rejected; the session has been cleared
    LoggedOut,
    /// The refresh could not complete; the session was left as it was
    Failed(String),
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed => "refreshed",
            RefreshOutcome::LoggedOut => "logged_out",
            RefreshOutcome::Failed(_) => "failed",
        }
    }
}

type OutcomeRx = watch::Receiver<Option<RefreshOutcome>>;

struct Inner {
    dispatcher: Arc<dyn Dispatcher>,
    session: Arc<SessionStore>,
    csrf: Arc<CsrfCache>,
    attacher: CredentialAttacher,
    settings: AuthSettings,
    slot: Mutex<Option<OutcomeRx>>,
    waiting: AtomicUsize,
}

/// Clears the in-flight slot when the refresh task finishes, however it
/// finishes.
struct SlotRelease(Arc<Inner>);

impl Drop for SlotRelease {
    fn drop(&mut self) {
        *self.0.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Counts callers suspended on an outcome.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared refresh coordinator. Cheap to clone; clones share the slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        session: Arc<SessionStore>,
        csrf: Arc<CsrfCache>,
        settings: AuthSettings,
    ) -> Result<Self> {
        let attacher = CredentialAttacher::new(session.clone(), csrf.clone(), &settings.csrf_header)?;
        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher,
                session,
                csrf,
                attacher,
                settings,
                slot: Mutex::new(None),
                waiting: AtomicUsize::new(0),
            }),
        })
    }

    pub(crate) fn attacher(&self) -> &CredentialAttacher {
        &self.inner.attacher
    }

    /// Lead or join a refresh and return its outcome.
    ///
    /// A signed-out session answers `LoggedOut` without touching the
    /// network. `Err` is only returned when the configured wait bound
    /// elapses; the refresh itself carries on.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        if self.inner.session.is_signed_out() {
            debug!("session signed out, not refreshing");
            return Ok(RefreshOutcome::LoggedOut);
        }
        let rx = self.join_or_lead();
        self.await_outcome(rx).await
    }

    /// Wait for the in-flight refresh, if any, without starting one.
    pub async fn wait_idle(&self) -> Result<()> {
        let in_flight = self.current();
        if let Some(rx) = in_flight {
            debug!("waiting for in-flight refresh before dispatch");
            self.await_outcome(rx).await?;
        }
        Ok(())
    }

    pub fn is_refreshing(&self) -> bool {
        self.current().is_some()
    }

    /// Callers currently suspended on a refresh outcome (leader included).
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<OutcomeRx> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn join_or_lead(&self) -> OutcomeRx {
        let mut slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = slot.as_ref() {
            debug!("joining in-flight refresh");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        drop(slot);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let release = SlotRelease(inner.clone());
            let outcome = inner.run_refresh().await;
            crate::metrics::record_refresh(&outcome);
            drop(release);
            let _ = tx.send(Some(outcome));
        });
        rx
    }

    async fn await_outcome(&self, mut rx: OutcomeRx) -> Result<RefreshOutcome> {
        let _waiting = Waiting::enter(&self.inner.waiting);
        let wait = async move {
            let outcome = match rx.wait_for(|o| o.is_some()).await {
                Ok(o) => (*o).clone(),
                Err(_) => None,
            };
            outcome.unwrap_or_else(|| RefreshOutcome::Failed("refresh task ended without an outcome".into()))
        };
        match self.inner.settings.refresh_wait {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                warn!(limit_ms = limit.as_millis() as u64, "gave up waiting for token refresh");
                Error::RefreshWaitTimeout(limit)
            }),
            None => Ok(wait.await),
        }
    }
}

impl Inner {
    async fn run_refresh(&self) -> RefreshOutcome {
        info!(path = %self.settings.refresh_path, "refreshing access token");

        let first = match self.send_refresh().await {
            Ok(c) => c,
            Err(reason) => return self.failed(reason),
        };

        let settled = match first {
            Classified::CsrfMismatch(_) => {
                info!("refresh rejected by anti-forgery check, bootstrapping");
                if let Err(e) =
                    crate::csrf::bootstrap(self.dispatcher.as_ref(), &self.attacher, &self.csrf, &self.settings).await
                {
                    return self.failed(e.to_string());
                }
                match self.send_refresh().await {
                    Ok(c) => c,
                    Err(reason) => return self.failed(reason),
                }
            }
            other => other,
        };

        match settled {
            Classified::Success(response) => match parse_auth_payload(&response.body) {
                Ok(payload) => {
                    if let Some(user) = payload.user {
                        self.session.set_user(user);
                    }
                    self.session.set_access_token(payload.access_token);
                    info!("access token refreshed");
                    RefreshOutcome::Refreshed
                }
                Err(e) => self.failed(format!("unusable refresh response: {e}")),
            },
            Classified::Unauthorized(_) => {
                warn!("refresh credential rejected, signing out");
                self.session.clear(ClearReason::RefreshRejected);
                RefreshOutcome::LoggedOut
            }
            Classified::CsrfMismatch(_) => {
                self.failed("anti-forgery check failed again after bootstrap".to_string())
            }
            Classified::OtherError(response) => {
                self.failed(format!("refresh returned status {}", response.status.as_u16()))
            }
        }
    }

    async fn send_refresh(&self) -> std::result::Result<Classified, String> {
        let request = self
            .attacher
            .attach(&PendingRequest::post(self.settings.refresh_path.as_str()).with_credentials(true))
            .map_err(|e| e.to_string())?;
        dispatch_and_classify(self.dispatcher.as_ref(), &request, &self.settings.csrf_marker)
            .await
            .map_err(|e| e.to_string())
    }

    fn failed(&self, reason: String) -> RefreshOutcome {
        warn!(reason = %reason, "token refresh failed, session kept");
        RefreshOutcome::Failed(reason)
    }
}

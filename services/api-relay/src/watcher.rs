//! Background session watcher
//!
//! Subscribes to session events and reacts to sign-outs: a forced sign-out
//! (refresh credential rejected) is logged loudly and counted, since every
//! relayed request will fail with 401 until someone signs in again.

use std::sync::Arc;

use session_auth::{ClearReason, SessionEvent, SessionStore};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Spawn the watcher. Runs until the session store is dropped.
pub fn spawn_session_watcher(session: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    let mut events = session.subscribe();
    drop(session);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => handle_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session watcher fell behind, some events were dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("session store dropped, watcher exiting");
                    break;
                }
            }
        }
    })
}

fn handle_event(event: &SessionEvent) {
    match event {
        SessionEvent::TokenUpdated => debug!("session token updated"),
        SessionEvent::Cleared(reason) => {
            crate::metrics::record_session_cleared(reason.label());
            match reason {
                ClearReason::RefreshRejected => warn!(
                    reason = reason.label(),
                    "session ended by the API; sign in again via POST /session/login"
                ),
                ClearReason::Logout => info!(reason = reason.label(), "session signed out"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_clears_and_exits_when_store_dropped() {
        let (recorder, handle) = crate::metrics::isolated_recorder();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let session = Arc::new(SessionStore::with_access_token("tok1"));
        let watcher = spawn_session_watcher(session.clone());

        session.set_access_token("tok2");
        session.clear(ClearReason::RefreshRejected);
        drop(session);

        watcher.await.unwrap();
        let output = handle.render();
        assert!(
            output.contains("relay_session_cleared_total{reason=\"refresh_rejected\"} 1"),
            "got: {output}"
        );
    }

    #[test]
    fn handle_event_records_logout() {
        let (recorder, handle) = crate::metrics::isolated_recorder();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        handle_event(&SessionEvent::Cleared(ClearReason::Logout));
        handle_event(&SessionEvent::TokenUpdated);

        assert!(handle.render().contains("reason=\"logout\""));
    }
}

//! Scripted in-memory dispatcher for pipeline tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use transport::{Dispatcher, PendingRequest, RawResponse, StatusCode, TransportError};

type Responder = dyn Fn(&PendingRequest, usize) -> RawResponse + Send + Sync;

/// Answers every request through `responder(request, nth_call_to_this_path)`.
///
/// Paths can be gated (held until permits are added), delayed (tokio sleep,
/// so paused-clock tests advance deterministically), or failed with a
/// connection error. Prefix matching lets `/meals` cover `/meals/a`.
pub struct FakeDispatcher {
    responder: Box<Responder>,
    log: Mutex<Vec<PendingRequest>>,
    gates: Mutex<Vec<(String, Arc<Semaphore>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    failures: Mutex<Vec<String>>,
    per_path: Mutex<HashMap<String, usize>>,
}

impl FakeDispatcher {
    pub fn new(responder: impl Fn(&PendingRequest, usize) -> RawResponse + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
            gates: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            per_path: Mutex::new(HashMap::new()),
        }
    }

    /// Hold every request under `prefix` until permits are added to the
    /// returned semaphore (one permit per request released).
    pub fn gate(&self, prefix: &str) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .push((prefix.to_string(), semaphore.clone()));
        semaphore
    }

    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.delays.lock().unwrap().push((prefix.to_string(), delay));
    }

    pub fn fail(&self, prefix: &str) {
        self.failures.lock().unwrap().push(prefix.to_string());
    }

    /// Number of requests dispatched whose path starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path().starts_with(prefix))
            .count()
    }

    /// Requests dispatched so far, in order, with the headers they carried.
    pub fn requests(&self) -> Vec<PendingRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<PendingRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path().starts_with(prefix))
            .collect()
    }

    fn gate_for(&self, path: &str) -> Option<Arc<Semaphore>> {
        self.gates
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, s)| s.clone())
    }

    fn delay_for(&self, path: &str) -> Option<Duration> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, d)| *d)
    }

    fn fails(&self, path: &str) -> bool {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Dispatcher for FakeDispatcher {
    fn id(&self) -> &str {
        "fake"
    }

    fn dispatch<'a>(
        &'a self,
        request: &'a PendingRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let path = request.path().to_string();
            self.log.lock().unwrap().push(request.clone());
            let nth = {
                let mut counts = self.per_path.lock().unwrap();
                let n = counts.entry(path.clone()).or_insert(0);
                *n += 1;
                *n
            };

            if let Some(gate) = self.gate_for(&path) {
                gate.acquire().await.unwrap().forget();
            }
            if let Some(delay) = self.delay_for(&path) {
                tokio::time::sleep(delay).await;
            }
            if self.fails(&path) {
                return Err(TransportError::Connect(format!("{path}: connection refused")));
            }
            Ok((self.responder)(request, nth))
        })
    }
}

pub fn json(status: u16, body: serde_json::Value) -> RawResponse {
    RawResponse::new(StatusCode::from_u16(status).unwrap(), body.to_string())
}

/// Refresh success envelope carrying `token`.
pub fn token_body(token: &str) -> RawResponse {
    json(
        200,
        serde_json::json!({"success": true, "data": {"accessToken": token, "user": {"_id": "u1"}}}),
    )
}

pub fn csrf_mismatch() -> RawResponse {
    json(
        403,
        serde_json::json!({"success": false, "error": "CSRF_VALIDATION_FAILED"}),
    )
}

/// `Authorization` header value a request carried, if any.
pub fn bearer(request: &PendingRequest) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Yield until `condition` holds. Panics after a generous number of yields
/// so a broken test fails instead of hanging.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

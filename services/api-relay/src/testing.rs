//! Loopback fake of the meal-planner API for router tests.
//!
//! Accepts `Bearer tok2` and `Bearer tok-login`; anything else gets a 401.
//! The refresh endpoint hands out tok2 (or rejects, if asked to).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use auth_pipeline::{AuthClient, AuthSettings};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use session_auth::SessionStore;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use transport::ReqwestDispatcher;

pub struct FakeApi {
    pub refresh_calls: AtomicUsize,
    reject_refresh: bool,
    refresh_gate: Option<Arc<Semaphore>>,
}

impl FakeApi {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

async fn refresh(State(api): State<Arc<FakeApi>>) -> Response {
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &api.refresh_gate {
        gate.acquire().await.unwrap().forget();
    }
    if api.reject_refresh {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"message": "refresh token expired"})),
        )
            .into_response();
    }
    axum::Json(serde_json::json!({
        "success": true,
        "data": {"accessToken": "tok2", "user": {"_id": "u1", "email": "cook@example.com"}}
    }))
    .into_response()
}

async fn login(axum::Json(body): axum::Json<serde_json::Value>) -> Response {
    if body["email"] == "cook@example.com" && body["password"] == "pw" {
        (
            [(axum::http::header::SET_COOKIE, "refreshToken=rt-1; Path=/; HttpOnly")],
            axum::Json(serde_json::json!({
                "success": true,
                "data": {"accessToken": "tok-login", "user": {"_id": "u9", "email": "cook@example.com"}}
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"message": "invalid credentials"})),
        )
            .into_response()
    }
}

async fn logout() -> impl IntoResponse {
    axum::Json(serde_json::json!({"success": true}))
}

async fn rate_limited() -> impl IntoResponse {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        r#"{"message":"slow down"}"#,
    )
}

fn authorized(headers: &HeaderMap) -> bool {
    matches!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer tok2") | Some("Bearer tok-login")
    )
}

/// Echo method, path, query, headers, and body as JSON for authorized
/// requests.
async fn echo(request: Request<Body>) -> Response {
    if !authorized(request.headers()) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"message": "jwt expired"})),
        )
            .into_response();
    }
    let mut headers_map = serde_json::Map::new();
    for (name, value) in request.headers() {
        headers_map.insert(
            name.to_string(),
            serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
        );
    }
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let body_bytes = axum::body::to_bytes(request.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    let body = serde_json::json!({
        "echoed_headers": headers_map,
        "method": method,
        "path": path,
        "query": query,
        "body": String::from_utf8_lossy(&body_bytes),
    });
    (
        StatusCode::OK,
        [("x-upstream-echo", "true"), ("set-cookie", "tracking=1; Path=/")],
        axum::Json(body),
    )
        .into_response()
}

pub async fn start_fake_api(reject_refresh: bool) -> (String, Arc<FakeApi>) {
    serve_fake_api(FakeApi {
        refresh_calls: AtomicUsize::new(0),
        reject_refresh,
        refresh_gate: None,
    })
    .await
}

/// Like `start_fake_api`, but the refresh endpoint holds every call until a
/// permit is added to the returned semaphore.
pub async fn start_gated_fake_api(reject_refresh: bool) -> (String, Arc<FakeApi>, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let (url, api) = serve_fake_api(FakeApi {
        refresh_calls: AtomicUsize::new(0),
        reject_refresh,
        refresh_gate: Some(gate.clone()),
    })
    .await;
    (url, api, gate)
}

async fn serve_fake_api(api: FakeApi) -> (String, Arc<FakeApi>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let api = Arc::new(api);

    let app = axum::Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/rate-limited", get(rate_limited))
        .fallback(echo)
        .with_state(api.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), api)
}

/// Pipeline client pointed at `upstream`, optionally seeded with a token.
pub fn test_client(upstream: &str, token: Option<&str>) -> AuthClient {
    let dispatcher =
        ReqwestDispatcher::new(reqwest::Client::new(), upstream, Duration::from_secs(5)).unwrap();
    let session = Arc::new(match token {
        Some(t) => SessionStore::with_access_token(t),
        None => SessionStore::new(),
    });
    AuthClient::new(Arc::new(dispatcher), session, AuthSettings::default()).unwrap()
}

/// Poll `condition` on the real clock until it holds, panicking after ~5s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

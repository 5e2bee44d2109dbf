//! Meal-planner API relay
//!
//! Single-binary Rust service that:
//! 1. Holds one authenticated session with the meal-planner API
//! 2. Listens for local HTTP requests
//! 3. Relays them upstream through the authenticated pipeline, which
//!    attaches credentials and recovers from expired tokens transparently
//! 4. Exposes health, Prometheus metrics, and session management routes

mod config;
mod error;
mod metrics;
mod relay;
mod service;
mod session;
#[cfg(test)]
mod testing;
mod watcher;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_pipeline::AuthClient;
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use session_auth::SessionStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestDispatcher;

use crate::config::Config;
use crate::relay::RelayState;
use crate::service::{DRAIN_TIMEOUT, ServiceMetrics};
use crate::session::SessionState;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    relay: RelayState,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit wraps every route, session routes included.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let session_router = session::build_session_router(SessionState::new(state.relay.client.clone()));
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(relay_handler)
        .with_state(state)
        .merge(session_router)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs; LOG_LEVEL wins over RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting meal-api-relay");

    // Install before anything records, pipeline counters included
    let prometheus_handle = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.relay.listen_addr,
        upstream_url = %config.relay.upstream_url,
        seeded_token = config.relay.access_token.is_some(),
        refresh_path = %config.auth.refresh_path,
        "configuration loaded"
    );

    let dispatcher = ReqwestDispatcher::new(
        reqwest::Client::new(),
        &config.relay.upstream_url,
        Duration::from_secs(config.relay.timeout_secs),
    )
    .context("failed to build upstream dispatcher")?;

    let session = Arc::new(match &config.relay.access_token {
        Some(token) => SessionStore::with_access_token(token.expose().clone()),
        None => SessionStore::new(),
    });

    let client = AuthClient::new(Arc::new(dispatcher), session.clone(), config.auth.to_settings())
        .context("failed to build authenticated client")?;

    let watcher = watcher::spawn_session_watcher(session);

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        relay: RelayState {
            client,
            metrics: metrics.clone(),
        },
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.relay.max_connections);

    let listen_addr = config.relay.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // Drain deadline starts at signal receipt, not at server start: signal
    // the server to drain, then race the drain against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = metrics.in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    watcher.abort();
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: 200 while a token is held, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counters = &state.relay.metrics;
    let uptime = counters.started_at.elapsed().as_secs();
    let requests = counters.requests_total.load(Ordering::Relaxed);
    let errors = counters.errors_total.load(Ordering::Relaxed);

    let client = &state.relay.client;
    let session = client.session();
    let refresh_in_flight = client.coordinator().is_refreshing();

    let (status_code, status, session_state) = if session.is_authenticated() {
        (axum::http::StatusCode::OK, "healthy", "active")
    } else if session.is_signed_out() {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded", "signed_out")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded", "none")
    };

    let body = serde_json::json!({
        "status": status,
        "session": session_state,
        "refresh_in_flight": refresh_in_flight,
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler that relays everything else upstream.
async fn relay_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    relay::relay_request(&state.relay, request, relay::new_request_id()).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

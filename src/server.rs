//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding config, the
//! request forwarder, the capture sink, and counters), [`build_router`]
//! for constructing the Axum router with middleware layers, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::capture::CaptureSink;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health::health_handler;
use crate::proxy;
use crate::proxy::forward::RequestForwarder;
use crate::upstream::UpstreamClient;

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<UpstreamClient>,
    pub forwarder: RequestForwarder,
    pub sink: CaptureSink,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    pub fn new(
        config: Arc<ProxyConfig>,
        upstream: Arc<UpstreamClient>,
        sink: CaptureSink,
    ) -> Result<Self, ProxyError> {
        let forwarder = RequestForwarder::new(Arc::clone(&upstream), &config)?;
        Ok(Self {
            config,
            upstream,
            forwarder,
            sink,
            start_time: Instant::now(),
            stats: Stats::new(),
        })
    }
}

/// Build the router. Request bodies are unbounded unless `max_body` is set;
/// a body over the limit is answered with 413 by the forwarding handler,
/// which still records the exchange.
pub fn build_router(state: Arc<AppState>, max_body: Option<usize>) -> Router {
    let mut router = Router::new();
    if let Some(path) = state.config.health_path.as_deref() {
        router = router.route(path, get(health_handler));
    }
    let body_limit = max_body.map_or_else(DefaultBodyLimit::disable, DefaultBodyLimit::max);
    router
        .fallback(proxy::forward_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(body_limit),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

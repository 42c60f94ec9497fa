//! Local health endpoint, mounted only when a health path is configured.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, upstream origin, exchange counters, and capture
//! pipeline counters.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub upstream: String,
    pub stats: StatsResponse,
    pub capture: CaptureResponse,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
}

#[derive(Serialize, Deserialize)]
pub struct CaptureResponse {
    pub submitted: u64,
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let capture = state.sink.stats();
    let status = if state.upstream.is_closed() {
        "stopping"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        upstream: state.config.origin().to_string(),
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
        },
        capture: CaptureResponse {
            submitted: capture.submitted.load(Ordering::Relaxed),
            written: capture.written.load(Ordering::Relaxed),
            dropped: capture.dropped.load(Ordering::Relaxed),
            failed: capture.failed.load(Ordering::Relaxed),
        },
    })
}

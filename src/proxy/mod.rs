//! Forwarding-and-capture pipeline.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every request. It snapshots the request for capture, forwards it once
//! ([`forward`]), and streams the upstream response back through the
//! capturing relay ([`relay`]). If the caller disconnects while the
//! upstream call is still pending, dropping the handler drops its
//! [`CaptureTap`], which records the cancellation. Failures are classified by
//! [`error_map`]; outbound header rules live in [`headers`].

pub mod error_map;
pub mod forward;
pub mod headers;
pub mod relay;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, Method, Uri};

use crate::capture::record::RequestSnapshot;
use crate::capture::CaptureTap;
use crate::server::AppState;
use forward::InboundRequest;
use relay::RelayLimits;

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + state.config.timeout;

    tracing::debug!(method = %method, path = %uri.path(), "request received");

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(
                method = %method,
                path = %uri.path(),
                status = rejection.status().as_u16(),
                error = %rejection.body_text(),
                "request body rejected, not forwarded"
            );
            let snapshot = RequestSnapshot::new(&method, &uri, &headers, &Bytes::new());
            CaptureTap::new(snapshot, state.sink.clone(), started)
                .reject(rejection.status(), &rejection.body_text());
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            return rejection.into_response();
        }
    };

    let inbound = InboundRequest {
        method,
        uri,
        headers,
        body,
    };

    let outbound = match state.forwarder.build(&inbound) {
        Ok(outbound) => outbound,
        Err(err) => {
            let snapshot =
                RequestSnapshot::new(&inbound.method, &inbound.uri, &inbound.headers, &inbound.body);
            CaptureTap::new(snapshot, state.sink.clone(), started).fail(&err);
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            return err.into_response();
        }
    };

    // Captured request headers are the ones actually sent upstream.
    let snapshot =
        RequestSnapshot::new(&inbound.method, &inbound.uri, outbound.headers(), &inbound.body);
    let tap = CaptureTap::new(snapshot, state.sink.clone(), started);

    match state.forwarder.send(outbound, deadline).await {
        Ok(upstream) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                status = upstream.status().as_u16(),
                head_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "upstream responded"
            );
            let limits = RelayLimits {
                deadline,
                idle_timeout: state.config.chunk_idle_timeout,
                capture_max_body: state.config.capture.max_body_bytes,
            };
            relay::relay(upstream, tap, limits).into_response()
        }
        Err(err) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tap.fail(&err);
            err.into_response()
        }
    }
}

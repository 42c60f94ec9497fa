//! Exactly-once hand-off from an exchange to the capture sink.
//!
//! A [`CaptureTap`] is created when a request arrives and resolved when the
//! exchange ends: by the relay when the upstream body completes, fails, or
//! is abandoned, or by the handler when the upstream call fails before any
//! response head. A tap dropped unresolved (the caller went away while the
//! handler was still waiting on upstream) records a cancellation. Each
//! exchange yields exactly one record.

use std::time::Instant;

use http::{HeaderMap, StatusCode};

use super::record::{header_pairs, CapturedBody, Outcome, RequestSnapshot, ResponseCapture};
use super::sink::CaptureSink;
use crate::error::ProxyError;

/// Status recorded when the caller disconnected before any response head.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

pub struct CaptureTap {
    /// `None` once the record has been submitted.
    request: Option<RequestSnapshot>,
    sink: CaptureSink,
    started: Instant,
    head: Option<(StatusCode, Vec<(String, String)>)>,
}

impl CaptureTap {
    #[must_use]
    pub const fn new(request: RequestSnapshot, sink: CaptureSink, started: Instant) -> Self {
        Self {
            request: Some(request),
            sink,
            started,
            head: None,
        }
    }

    /// Record the upstream status and headers as relayed to the caller.
    pub fn on_first_headers(&mut self, status: StatusCode, headers: &HeaderMap) {
        if self.head.is_none() {
            self.head = Some((status, header_pairs(headers)));
        }
    }

    /// The exchange ended after the response head was relayed.
    pub fn resolve(mut self, body: CapturedBody, outcome: Outcome, error: Option<ProxyError>) {
        let (status, headers) = self
            .head
            .take()
            .unwrap_or((StatusCode::BAD_GATEWAY, Vec::new()));
        self.submit(ResponseCapture {
            status,
            headers,
            body,
            elapsed: self.started.elapsed(),
            outcome,
            error,
        });
    }

    /// The exchange ended before any upstream head arrived.
    pub fn fail(mut self, err: &ProxyError) {
        let capture = ResponseCapture::failed(err, self.started.elapsed());
        self.submit(capture);
    }

    /// The proxy refused the request itself (e.g. an unreadable body), so
    /// nothing was forwarded. `message` is what the caller was sent.
    pub fn reject(mut self, status: StatusCode, message: &str) {
        self.submit(ResponseCapture {
            status,
            headers: Vec::new(),
            body: CapturedBody::from_bytes(message.as_bytes()),
            elapsed: self.started.elapsed(),
            outcome: Outcome::Failed,
            error: None,
        });
    }

    fn submit(&mut self, capture: ResponseCapture) {
        if let Some(request) = self.request.take() {
            self.sink.submit(request.into_record(capture));
        }
    }
}

impl Drop for CaptureTap {
    fn drop(&mut self) {
        if self.request.is_none() {
            return;
        }
        tracing::info!("caller went away before the upstream responded");
        let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_GATEWAY);
        let capture = ResponseCapture {
            status,
            headers: Vec::new(),
            body: CapturedBody::empty(),
            elapsed: self.started.elapsed(),
            outcome: Outcome::Cancelled,
            error: None,
        };
        self.submit(capture);
    }
}

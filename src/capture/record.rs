//! The unit written to the capture log.
//!
//! One [`CaptureRecord`] is produced per exchange and serialized as a
//! single JSON line. Headers are kept as ordered `[name, value]` pairs so
//! repeated headers survive. Bodies are stored as text when they are
//! valid UTF-8 and as base64 otherwise; response bodies above the capture
//! cap are marked as omitted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, SecondsFormat, Utc};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::{Serialize, Serializer};

use crate::error::{ErrorKind, ProxyError};

#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    #[serde(serialize_with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub request_headers: Vec<(String, String)>,
    pub request_body: CapturedBody,
    pub status: u16,
    pub response_headers: Vec<(String, String)>,
    pub response_body: CapturedBody,
    pub duration_ms: f64,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Upstream body fully relayed.
    Complete,
    /// Upstream failed mid-stream; the caller saw a cut-off body.
    Truncated,
    /// Upstream failed before any response head; the caller got a mapped status.
    Failed,
    /// The caller went away before the body finished.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ProxyError> for ErrorRecord {
    fn from(err: &ProxyError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CapturedBody {
    Text(String),
    Binary {
        encoding: &'static str,
        data: String,
    },
    Omitted {
        omitted: bool,
        captured_bytes: usize,
        total_bytes: usize,
    },
}

impl CapturedBody {
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Binary {
                encoding: "base64",
                data: STANDARD.encode(bytes),
            },
        }
    }

    #[must_use]
    pub const fn omitted(captured_bytes: usize, total_bytes: usize) -> Self {
        Self::Omitted {
            omitted: true,
            captured_bytes,
            total_bytes,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::Text(String::new())
    }
}

/// Response bytes accumulated by the relay.
///
/// Appends past `limit` are counted but not stored; the finished body
/// then reports itself as omitted.
#[derive(Debug)]
pub struct CaptureBuffer {
    buf: BytesMut,
    limit: usize,
    total: usize,
}

impl CaptureBuffer {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
            total: 0,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.total += chunk.len();
        let room = self.limit.saturating_sub(self.buf.len());
        if room > 0 {
            self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn finish(self) -> CapturedBody {
        if self.total > self.buf.len() {
            CapturedBody::omitted(self.buf.len(), self.total)
        } else {
            CapturedBody::from_bytes(&self.buf)
        }
    }
}

/// Request half of a record, taken when the exchange starts.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: CapturedBody,
}

impl RequestSnapshot {
    #[must_use]
    pub fn new(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Self {
        Self {
            timestamp: Utc::now(),
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(String::from),
            headers: header_pairs(headers),
            body: CapturedBody::from_bytes(body),
        }
    }

    /// Combine with the response half into the final record.
    #[must_use]
    pub fn into_record(self, response: ResponseCapture) -> CaptureRecord {
        CaptureRecord {
            timestamp: self.timestamp,
            method: self.method,
            path: self.path,
            query: self.query,
            request_headers: self.headers,
            request_body: self.body,
            status: response.status.as_u16(),
            response_headers: response.headers,
            response_body: response.body,
            duration_ms: round_ms(response.elapsed),
            outcome: response.outcome,
            error: response.error.as_ref().map(ErrorRecord::from),
        }
    }
}

/// Response half of a record, produced when the relay finishes.
#[derive(Debug)]
pub struct ResponseCapture {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: CapturedBody,
    pub elapsed: std::time::Duration,
    pub outcome: Outcome,
    pub error: Option<ProxyError>,
}

impl ResponseCapture {
    /// Capture for an exchange that failed before any upstream head arrived.
    #[must_use]
    pub fn failed(err: &ProxyError, elapsed: std::time::Duration) -> Self {
        Self {
            status: err.status(),
            headers: Vec::new(),
            body: CapturedBody::empty(),
            elapsed,
            outcome: Outcome::Failed,
            error: Some(err.clone()),
        }
    }
}

/// Header map as ordered pairs; non-UTF-8 values are decoded lossily.
#[must_use]
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn round_ms(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_micros() as f64 / 10.0).round() / 100.0
}

fn rfc3339_millis<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

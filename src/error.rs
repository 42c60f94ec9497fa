//! Unified error types for teeproxy.
//!
//! Defines [`TeeProxyError`] (startup and CLI failures), [`ProxyError`]
//! (the caller-facing exchange taxonomy) and [`CaptureError`] (capture
//! write failures, which never leave the sink worker). All use
//! `thiserror` for `Display` and `Error` derives.

use axum::response::{IntoResponse, Response};
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TeeProxyError {
    #[error("Invalid target URL '{url}': {message}")]
    InvalidTarget { url: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Capture log unavailable: {0}")]
    Capture(#[from] CaptureError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

/// Failure of a single exchange, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream transport error: {0}")]
    UpstreamTransportError(String),

    #[error("upstream unexpected failure: {0}")]
    UpstreamUnexpected(String),
}

impl ProxyError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamTransportError(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            Self::UpstreamTransportError(_) => ErrorKind::UpstreamTransportError,
            Self::UpstreamUnexpected(_) => ErrorKind::UpstreamUnexpected,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::UpstreamTimeout(m)
            | Self::UpstreamTransportError(m)
            | Self::UpstreamUnexpected(m) => m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UpstreamTimeout,
    UpstreamTransportError,
    UpstreamUnexpected,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamTimeout => "upstream timeout",
            Self::UpstreamTransportError => "upstream transport error",
            Self::UpstreamUnexpected => "upstream unexpected failure",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.kind().as_str(),
        )
            .into_response()
    }
}

/// Internal to the capture worker; reported only through `tracing`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("capture write failed ({path}): {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_fixed() {
        assert_eq!(
            ProxyError::UpstreamTimeout("t".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::UpstreamTransportError("r".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::UpstreamUnexpected("u".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn response_body_names_failure_class() {
        use http_body_util::BodyExt;

        let resp = ProxyError::UpstreamTransportError("connection refused".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"upstream transport error");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UpstreamTimeout).unwrap();
        assert_eq!(json, "\"upstream_timeout\"");
    }
}

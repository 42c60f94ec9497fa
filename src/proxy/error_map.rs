//! Classification of upstream failures into the caller-facing taxonomy.
//!
//! Every failure on the upstream leg, whether it happens before the
//! response headers arrive or while the body is streaming, goes through
//! [`classify`]. The mapping is fixed:
//!
//! | Failure | [`ProxyError`] | Status |
//! |---------|----------------|--------|
//! | deadline / idle timeout, connect or read timeout | `UpstreamTimeout` | 504 |
//! | refused, reset, TLS, protocol violation | `UpstreamTransportError` | 502 |
//! | anything else (closed client, unbuildable request) | `UpstreamUnexpected` | 500 |

use std::error::Error as StdError;
use std::fmt::Write;

use crate::error::ProxyError;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Raw failure observed on the upstream leg, before classification.
#[derive(Debug)]
pub enum UpstreamFailure {
    /// The end-to-end deadline for the exchange passed.
    DeadlineElapsed,
    /// No body chunk arrived within the configured idle window.
    IdleTimeout,
    /// The pooled client failed to send the request or read the head.
    Request(hyper_util::client::legacy::Error),
    /// Reading a body frame failed after the head was relayed.
    Body(BoxError),
    /// Already classified upstream of the mapper (e.g. closed client).
    Proxy(ProxyError),
    /// Anything the proxy did not anticipate.
    Other(String),
}

pub fn classify(failure: UpstreamFailure) -> ProxyError {
    let mapped = match failure {
        UpstreamFailure::DeadlineElapsed => {
            ProxyError::UpstreamTimeout("upstream did not complete within the request timeout".into())
        }
        UpstreamFailure::IdleTimeout => {
            ProxyError::UpstreamTimeout("upstream stalled between body chunks".into())
        }
        UpstreamFailure::Request(e) => {
            let detail = describe(&e);
            if chain_has_timeout(&e) {
                ProxyError::UpstreamTimeout(detail)
            } else {
                ProxyError::UpstreamTransportError(detail)
            }
        }
        UpstreamFailure::Body(e) => {
            let detail = describe(e.as_ref());
            if chain_has_timeout(e.as_ref()) {
                ProxyError::UpstreamTimeout(detail)
            } else {
                ProxyError::UpstreamTransportError(detail)
            }
        }
        UpstreamFailure::Proxy(e) => e,
        UpstreamFailure::Other(detail) => ProxyError::UpstreamUnexpected(detail),
    };

    tracing::error!(
        kind = mapped.kind().as_str(),
        status = mapped.status().as_u16(),
        error = %mapped.message(),
        "upstream failure"
    );
    mapped
}

fn chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<hyper::Error>()
            .is_some_and(hyper::Error::is_timeout)
        {
            return true;
        }
        if e.downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return true;
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Flatten an error and its sources into one line.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let text = e.to_string();
        if !out.ends_with(&text) {
            // write! to String is infallible
            let _ = write!(out, ": {text}");
        }
        source = e.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper(std::io::Error);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("connect error")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn deadline_maps_to_timeout() {
        let err = classify(UpstreamFailure::DeadlineElapsed);
        assert_eq!(err.status().as_u16(), 504);
    }

    #[test]
    fn idle_timeout_maps_to_timeout() {
        let err = classify(UpstreamFailure::IdleTimeout);
        assert!(matches!(err, ProxyError::UpstreamTimeout(_)));
    }

    #[test]
    fn nested_io_timeout_maps_to_timeout() {
        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
        let err = classify(UpstreamFailure::Body(Box::new(Wrapper(inner))));
        assert!(matches!(err, ProxyError::UpstreamTimeout(_)));
        assert_eq!(err.message(), "connect error: connect timed out");
    }

    #[test]
    fn refused_maps_to_bad_gateway() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify(UpstreamFailure::Body(Box::new(Wrapper(inner))));
        assert!(matches!(err, ProxyError::UpstreamTransportError(_)));
        assert_eq!(err.status().as_u16(), 502);
    }

    #[test]
    fn unclassified_maps_to_internal_error() {
        let err = classify(UpstreamFailure::Other("request builder rejected uri".into()));
        assert_eq!(err.status().as_u16(), 500);
    }

    #[test]
    fn preclassified_passes_through() {
        let original = ProxyError::UpstreamUnexpected("upstream client closed".into());
        assert_eq!(classify(UpstreamFailure::Proxy(original.clone())), original);
    }
}

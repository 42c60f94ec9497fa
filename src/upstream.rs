//! Connection-pooled HTTP client bound to the single upstream origin.
//!
//! [`UpstreamClient`] is opened once at startup and closed once at
//! shutdown. Each exchange checks out a cheap clone of the inner hyper
//! client; closing drops the shared handle so idle pooled connections are
//! released as soon as the last in-flight exchange finishes, and any later
//! checkout fails.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::ProxyError;

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Full<Bytes>>;

pub struct UpstreamClient {
    inner: RwLock<Option<HttpClient>>,
}

impl UpstreamClient {
    #[must_use]
    pub fn open(pool_max_idle: usize) -> Self {
        // When multiple rustls crypto providers are compiled in, rustls cannot
        // auto-detect which one to use. Explicitly install `ring`.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(pool_max_idle)
            .build(https);

        tracing::debug!(pool_max_idle, "upstream client opened");
        Self {
            inner: RwLock::new(Some(client)),
        }
    }

    /// Check out a handle to the pooled client for one exchange.
    pub fn checkout(&self) -> Result<HttpClient, ProxyError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ProxyError::UpstreamUnexpected("upstream client closed".into()))
    }

    /// Release the pool. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let taken = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            tracing::info!("upstream client closed");
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

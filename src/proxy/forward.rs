//! Building and issuing the single outbound request for an exchange.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use tokio::time::Instant;

use super::error_map::{classify, UpstreamFailure};
use super::headers::build_outbound_headers;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::upstream::UpstreamClient;

/// The request as received from the caller.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct RequestForwarder {
    upstream: Arc<UpstreamClient>,
    origin: String,
    authority: HeaderValue,
    strip_hop_by_hop: bool,
}

impl RequestForwarder {
    pub fn new(upstream: Arc<UpstreamClient>, config: &ProxyConfig) -> Result<Self, ProxyError> {
        let authority = HeaderValue::from_str(&config.authority()).map_err(|e| {
            ProxyError::UpstreamUnexpected(format!("upstream authority is not a valid header: {e}"))
        })?;
        Ok(Self {
            upstream,
            origin: config.origin().to_string(),
            authority,
            strip_hop_by_hop: config.strip_hop_by_hop,
        })
    }

    /// `{origin}{path}{?query}`, concatenated without re-encoding.
    #[must_use]
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{}", self.origin, path_and_query)
    }

    pub fn build(&self, inbound: &InboundRequest) -> Result<Request<Full<Bytes>>, ProxyError> {
        let url = self.target_url(&inbound.uri);
        let mut request = Request::builder()
            .method(inbound.method.clone())
            .uri(url)
            .body(Full::new(inbound.body.clone()))
            .map_err(|e| classify(UpstreamFailure::Other(format!("cannot build upstream request: {e}"))))?;
        *request.headers_mut() =
            build_outbound_headers(&inbound.headers, &self.authority, self.strip_hop_by_hop);
        Ok(request)
    }

    /// Send a built request. Exactly one attempt; the deadline covers
    /// connecting, writing the request, and receiving the response head.
    pub async fn send(
        &self,
        outbound: Request<Full<Bytes>>,
        deadline: Instant,
    ) -> Result<Response<Incoming>, ProxyError> {
        let client = self
            .upstream
            .checkout()
            .map_err(|e| classify(UpstreamFailure::Proxy(e)))?;

        match tokio::time::timeout_at(deadline, client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(classify(UpstreamFailure::Request(e))),
            Err(_) => Err(classify(UpstreamFailure::DeadlineElapsed)),
        }
    }

    pub async fn forward(
        &self,
        inbound: &InboundRequest,
        deadline: Instant,
    ) -> Result<Response<Incoming>, ProxyError> {
        let outbound = self.build(inbound)?;
        self.send(outbound, deadline).await
    }
}

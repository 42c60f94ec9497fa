//! Streaming the upstream response to the caller while teeing a copy.
//!
//! [`relay`] opens the caller-facing response with the upstream status and
//! headers verbatim, then wraps the upstream body in a [`RelayBody`]. Each
//! frame the server pulls from it is forwarded and, in the same poll,
//! appended to the capture buffer, so the upstream body is read exactly
//! once. When the stream ends, fails, or is dropped by the server because
//! the caller went away, the exchange's [`CaptureTap`] is resolved.
//!
//! Once the head has been sent the status can no longer change: an error
//! mid-body can only cut the stream short.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::Response;
use http_body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use super::error_map::{classify, BoxError, UpstreamFailure};
use crate::capture::record::{CaptureBuffer, Outcome};
use crate::capture::CaptureTap;
use crate::error::ProxyError;

/// Time limits applied while the body streams.
#[derive(Debug, Clone, Copy)]
pub struct RelayLimits {
    /// End-to-end deadline shared with the request leg.
    pub deadline: Instant,
    /// Longest allowed gap between body frames, if any.
    pub idle_timeout: Option<Duration>,
    /// Response bytes kept for the capture record.
    pub capture_max_body: usize,
}

pub fn relay<B>(upstream: Response<B>, mut tap: CaptureTap, limits: RelayLimits) -> Response<RelayBody<B>>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    let (parts, body) = upstream.into_parts();
    tap.on_first_headers(parts.status, &parts.headers);
    Response::from_parts(parts, RelayBody::new(body, tap, limits))
}

pub struct RelayBody<B>
where
    B: Body,
{
    inner: B,
    buffer: CaptureBuffer,
    tap: Option<CaptureTap>,
    deadline: Pin<Box<Sleep>>,
    idle: Option<(Duration, Pin<Box<Sleep>>)>,
}

impl<B> RelayBody<B>
where
    B: Body,
{
    fn new(inner: B, tap: CaptureTap, limits: RelayLimits) -> Self {
        Self {
            inner,
            buffer: CaptureBuffer::new(limits.capture_max_body),
            tap: Some(tap),
            deadline: Box::pin(tokio::time::sleep_until(limits.deadline)),
            idle: limits
                .idle_timeout
                .map(|d| (d, Box::pin(tokio::time::sleep(d)))),
        }
    }

    fn finish(&mut self, outcome: Outcome, error: Option<ProxyError>) {
        if let Some(tap) = self.tap.take() {
            let buffer = std::mem::replace(&mut self.buffer, CaptureBuffer::new(0));
            tap.resolve(buffer.finish(), outcome, error);
        }
    }

    fn fail(&mut self, failure: UpstreamFailure) -> ProxyError {
        let err = classify(failure);
        tracing::warn!(
            relayed_bytes = self.buffer.total(),
            kind = err.kind().as_str(),
            "response stream truncated after head was sent"
        );
        self.finish(Outcome::Truncated, Some(err.clone()));
        err
    }
}

impl<B> Body for RelayBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = ProxyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ProxyError>>> {
        let this = self.get_mut();
        if this.tap.is_none() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.buffer.append(data);
                }
                if let Some((window, idle)) = this.idle.as_mut() {
                    idle.as_mut().reset(Instant::now() + *window);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                let err = this.fail(UpstreamFailure::Body(e.into()));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish(Outcome::Complete, None);
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_ready() {
                    let err = this.fail(UpstreamFailure::DeadlineElapsed);
                    return Poll::Ready(Some(Err(err)));
                }
                if let Some((_, idle)) = this.idle.as_mut() {
                    if idle.as_mut().poll(cx).is_ready() {
                        let err = this.fail(UpstreamFailure::IdleTimeout);
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Pending
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.tap.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for RelayBody<B>
where
    B: Body,
{
    fn drop(&mut self) {
        if self.tap.is_none() {
            return;
        }
        // Bodiless responses (HEAD, 204, 304) are never polled by the server.
        if self.inner.is_end_stream() {
            self.finish(Outcome::Complete, None);
        } else {
            tracing::info!(
                relayed_bytes = self.buffer.total(),
                "caller went away before the response completed"
            );
            self.finish(Outcome::Cancelled, None);
        }
    }
}

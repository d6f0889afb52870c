//! Response relay.
//!
//! # Responsibilities
//! - Copy the backend status and headers onto the client response
//! - Stream the backend body to the client unmodified
//! - Keep the request span open until the body is fully relayed
//!
//! # Design Decisions
//! - The span rides inside the response body, so it ends when the body
//!   completes, fails, or is dropped by the server
//! - A body error after the status line is only recorded; the client sees a
//!   truncated response

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::Response;
use http_body::{Body as _, Frame, SizeHint};
use hyper::body::Incoming;

use crate::error::ProxyError;
use crate::observability::span::ProxySpan;

/// Response body that owns the request span.
pub struct TracedBody {
    inner: Body,
    span: ProxySpan,
    finished: bool,
}

impl TracedBody {
    pub fn new(inner: Body, span: ProxySpan) -> Self {
        Self {
            inner,
            span,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.span.end();
    }
}

impl http_body::Body for TracedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Err(err)) => {
                tracing::error!(error = %err, "error copying response");
                this.span.record_error(Some(&err));
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TracedBody {
    fn drop(&mut self) {
        // The server may stop polling once the body reports its end.
        if !self.finished && !self.inner.is_end_stream() {
            tracing::warn!("client went away before the response body was relayed");
            self.span.record_error(Some(&ProxyError::BodyAborted));
        }
        self.finish();
    }
}

/// Build the client response from the backend response.
pub fn relay(response: Response<Incoming>, span: ProxySpan) -> Response<Body> {
    let (parts, body) = response.into_parts();

    let mut relayed = Response::new(Body::new(TracedBody::new(Body::new(body), span)));
    *relayed.status_mut() = parts.status;
    for (name, value) in parts.headers.iter() {
        relayed.headers_mut().append(name.clone(), value.clone());
    }
    relayed
}

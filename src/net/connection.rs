//! Per-connection serving and lifecycle tracking.
//!
//! # Responsibilities
//! - Serve HTTP/1 and HTTP/2 on an accepted socket with the inbound limits
//! - Hand each request the client socket address
//! - Close keep-alive connections left idle too long
//! - Finish in-flight requests and close once the server drains

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use http_body::{Body as _, Frame, SizeHint};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tower::ServiceExt;

use crate::config::ProxyConfig;
use crate::net::io::TrackedIo;

/// Inbound limits applied to every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub header_read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            header_read_timeout: config.timeouts.header_read(),
            write_timeout: config.timeouts.write(),
            idle_timeout: config.timeouts.idle(),
            max_header_bytes: config.listener.max_header_bytes,
        }
    }

    /// Connection builder carrying the header limits.
    ///
    /// `max_header_bytes` must be at least 8 KiB; config validation enforces it.
    pub fn builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.header_read_timeout)
            .max_buf_size(self.max_header_bytes);
        builder
            .http2()
            .timer(TokioTimer::new())
            .max_header_list_size(u32::try_from(self.max_header_bytes).unwrap_or(u32::MAX));
        builder
    }
}

/// Activity bookkeeping for one connection.
#[derive(Debug)]
pub struct ConnectionActivity {
    started: Instant,
    /// Milliseconds since `started` of the last byte moved.
    last_active_ms: AtomicU64,
    in_flight: AtomicUsize,
    became_idle: Notify,
}

impl ConnectionActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            last_active_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            became_idle: Notify::new(),
        })
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn touch(&self) {
        self.last_active_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Mark a request in flight until the returned guard drops.
    pub fn begin_request(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        RequestGuard {
            activity: Arc::clone(self),
        }
    }

    /// How long the connection has been idle, or `None` while a request is in flight.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let last = self.last_active_ms.load(Ordering::Relaxed);
        Some(Duration::from_millis(self.now_ms().saturating_sub(last)))
    }

    /// Resolves once the connection has been idle for `limit`.
    pub async fn idle_timeout(&self, limit: Duration) {
        loop {
            match self.idle_for() {
                Some(idle) if idle >= limit => return,
                Some(idle) => tokio::time::sleep(limit - idle).await,
                None => self.became_idle.notified().await,
            }
        }
    }
}

/// Keeps a request counted as in flight.
#[derive(Debug)]
pub struct RequestGuard {
    activity: Arc<ConnectionActivity>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.touch();
        if self.activity.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.activity.became_idle.notify_one();
        }
    }
}

/// Response body that keeps its request in flight until relayed.
pub struct ActiveBody {
    inner: Body,
    _request: RequestGuard,
}

impl ActiveBody {
    pub fn new(inner: Body, request: RequestGuard) -> Self {
        Self {
            inner,
            _request: request,
        }
    }
}

impl http_body::Body for ActiveBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Serve one accepted connection until it closes.
///
/// The connection closes gracefully when `drain` fires or when it has sat
/// idle for the idle timeout; in-flight requests finish first.
pub async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    router: Router,
    builder: Arc<Builder<TokioExecutor>>,
    settings: ConnectionSettings,
    mut drain: watch::Receiver<()>,
) {
    let activity = ConnectionActivity::new();
    let io = TokioIo::new(TrackedIo::new(
        stream,
        Arc::clone(&activity),
        settings.write_timeout,
    ));

    let service = {
        let activity = Arc::clone(&activity);
        service_fn(move |mut request: Request<Incoming>| {
            let router = router.clone();
            let guard = activity.begin_request();
            request.extensions_mut().insert(ConnectInfo(remote_addr));
            async move {
                let response = router.oneshot(request).await?;
                Ok::<_, Infallible>(response.map(|body| Body::new(ActiveBody::new(body, guard))))
            }
        })
    };

    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(client = %remote_addr, error = %e, "Connection closed with error");
                }
                break;
            }
            _ = drain.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = activity.idle_timeout(settings.idle_timeout), if !closing => {
                tracing::debug!(client = %remote_addr, "Closing idle connection");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = ProxyConfig::default();
        config.timeouts.idle_secs = 7;
        config.listener.max_header_bytes = 16 * 1024;

        let settings = ConnectionSettings::from_config(&config);
        assert_eq!(settings.idle_timeout, Duration::from_secs(7));
        assert_eq!(settings.header_read_timeout, Duration::from_secs(30));
        assert_eq!(settings.write_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_header_bytes, 16 * 1024);
    }

    #[test]
    fn test_in_flight_request_is_never_idle() {
        let activity = ConnectionActivity::new();
        assert!(activity.idle_for().is_some());

        let first = activity.begin_request();
        let second = activity.begin_request();
        assert!(activity.idle_for().is_none());

        drop(first);
        assert!(activity.idle_for().is_none());
        drop(second);
        assert!(activity.idle_for().is_some());
    }

    #[tokio::test]
    async fn test_idle_timeout_fires_without_requests() {
        let activity = ConnectionActivity::new();
        let waited = tokio::time::timeout(
            Duration::from_secs(1),
            activity.idle_timeout(Duration::from_millis(50)),
        )
        .await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_idle_timeout_waits_for_request_to_finish() {
        let activity = ConnectionActivity::new();
        let guard = activity.begin_request();

        let held = tokio::time::timeout(
            Duration::from_millis(150),
            activity.idle_timeout(Duration::from_millis(50)),
        )
        .await;
        assert!(held.is_err());

        drop(guard);
        let released = tokio::time::timeout(
            Duration::from_secs(1),
            activity.idle_timeout(Duration::from_millis(50)),
        )
        .await;
        assert!(released.is_ok());
    }
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trace_proxy::config::ProxyConfig;
use trace_proxy::observability::id::ProxyIdGenerator;
use trace_proxy::{HttpServer, Shutdown};

/// A proxy running on an ephemeral port, exporting spans in memory.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub exporter: InMemorySpanExporter,
    provider: SdkTracerProvider,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    /// Wait until at least `count` spans have finished.
    pub async fn spans(&self, count: usize) -> Vec<SpanData> {
        for _ in 0..200 {
            let spans = self.exporter.get_finished_spans().unwrap();
            if spans.len() >= count {
                return spans;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} finished spans");
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
        let _ = self.provider.shutdown();
    }
}

/// Start a proxy forwarding to `forward`.
pub async fn start_proxy(forward: &str, customize: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .with_id_generator(ProxyIdGenerator)
        .build();

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.forward.address = forward.to_string();
    customize(&mut config);

    let listener = TcpListener::bind(config.listener.socket_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, provider.tracer("trace-proxy-test"));
    tokio::spawn(server.run(listener, shutdown.signalled()));

    TestProxy {
        addr,
        exporter,
        provider,
        shutdown,
    }
}

/// Serve `router` on an ephemeral port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend that echoes the request back.
///
/// - status from `x-echo-status` (default 200)
/// - `x-echo-method`, `x-echo-uri`: method and path+query as received
/// - `x-seen-<name>` for every request header value
/// - two `set-cookie` values
/// - the request body as the response body
pub async fn start_echo_backend() -> SocketAddr {
    start_backend(Router::new().fallback(echo)).await
}

async fn echo(request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let status = parts
        .headers
        .get("x-echo-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u16>().ok())
        .and_then(|v| StatusCode::from_u16(v).ok())
        .unwrap_or(StatusCode::OK);

    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert("x-echo-method", HeaderValue::from_str(parts.method.as_str()).unwrap());
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    headers.insert("x-echo-uri", HeaderValue::from_str(uri).unwrap());
    for (name, value) in parts.headers.iter() {
        let seen = HeaderName::from_bytes(format!("x-seen-{name}").as_bytes()).unwrap();
        headers.append(seen, value.clone());
    }
    headers.append("set-cookie", HeaderValue::from_static("a=1"));
    headers.append("set-cookie", HeaderValue::from_static("b=2"));
    response
}

/// Raw TCP backend that writes `raw` verbatim and closes the connection.
pub async fn start_raw_backend(raw: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut request = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => request.extend_from_slice(&buf[..n]),
                            }
                        }
                        let _ = socket.write_all(raw.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn attr(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv: &&KeyValue| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn error_events(span: &SpanData) -> usize {
    span.events.iter().filter(|e| e.name == "exception").count()
}

//! HTTP server setup and the forwarding handler.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all forwarding handler
//! - Wire up middleware (request logging)
//! - Accept connections, serve them with the inbound limits, drain on shutdown
//! - Forward every request to the configured backend inside a "proxy" span
//!
//! # Design Decisions
//! - No request-level deadline wraps the handler: a slow backend is reported
//!   by the upstream timeout as a 500 with the error on the span

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use opentelemetry::Context;
use opentelemetry_sdk::trace::SdkTracer;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::identity::extract_identity;
use crate::http::request::build_outbound;
use crate::http::response::relay;
use crate::net::{serve_connection, ConnectionSettings};
use crate::observability::id;
use crate::observability::span::{AttrValue, Attributes, ProxySpan};

/// Name of the span opened for every forwarded request.
pub const PROXY_SPAN_NAME: &str = "proxy";

/// Span attribute carrying the backend status code.
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forward: Arc<str>,
    pub client: Client<HttpConnector, Body>,
    pub tracer: SdkTracer,
    pub upstream_timeout: Duration,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and tracer.
    pub fn new(config: ProxyConfig, tracer: SdkTracer) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            forward: Arc::from(config.forward.address.as_str()),
            client,
            tracer,
            upstream_timeout: config.timeouts.upstream(),
        };

        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` resolves, then drain open connections.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let settings = ConnectionSettings::from_config(&self.config);
        tracing::info!(
            address = %addr,
            forward = %self.config.forward.address,
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            max_header_bytes = settings.max_header_bytes,
            "HTTP server starting"
        );

        let builder = Arc::new(settings.builder());
        let (drain_tx, drain_rx) = watch::channel(());
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };

            tokio::spawn(serve_connection(
                stream,
                remote_addr,
                self.router.clone(),
                Arc::clone(&builder),
                settings,
                drain_rx.clone(),
            ));
        }

        drop(listener);
        drop(drain_rx);
        tracing::info!("Draining open connections");
        let _ = drain_tx.send(());
        drain_tx.closed().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward one request to the backend and relay the answer.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let identity = extract_identity(request.headers(), remote_addr);

    let mut span = ProxySpan::start(
        &state.tracer,
        &Context::current(),
        PROXY_SPAN_NAME,
        id::trace_id_for(&identity.chosen),
        [&identity.span_attributes()],
    );

    tracing::debug!(
        client = %identity.chosen,
        source = %identity.chosen_source(),
        method = %request.method(),
        uri = %request.uri(),
        "Proxying request"
    );

    match forward(&state, request).await {
        Ok(response) => {
            let status = response.status();
            span.set_attributes([&Attributes::from([(
                HTTP_STATUS_CODE.to_string(),
                AttrValue::from(status),
            )])]);
            tracing::debug!(client = %identity.chosen, status = %status, "Backend responded");
            relay(response, span)
        }
        Err(err) => {
            tracing::error!(client = %identity.chosen, error = %err, "Upstream error");
            span.record_error(Some(&err));
            span.end();
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Build and issue the outbound request. Single attempt.
async fn forward(state: &AppState, request: Request<Body>) -> Result<Response<Incoming>, ProxyError> {
    let outbound = build_outbound(request, &state.forward)?;

    match tokio::time::timeout(state.upstream_timeout, state.client.request(outbound)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProxyError::UpstreamTimeout(state.upstream_timeout)),
    }
}

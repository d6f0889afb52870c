//! trace-proxy
//!
//! Forwards every request to a single backend and records one OpenTelemetry
//! span per request, keyed on the client address.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ identity ──▶ "proxy" span ──▶ outbound  ─┼──▶ Backend
//!                           │   (chosen      (trace id =      request    │
//!                           │    address)     md5(address))              │
//!     Client Response       │                                            │
//!     ◀─────────────────────┼── streamed body (span ends on completion) ◀┼─── Backend
//!                           └────────────────────────────────────────────┘
//!                                        │
//!                                        ▼
//!                                  OTLP exporter
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use trace_proxy::config::{load_config, validate_config, ConfigError, LogFormat, ProxyConfig};
use trace_proxy::lifecycle::{shutdown_signal, Shutdown};
use trace_proxy::observability::logging::init_logging;
use trace_proxy::{HttpServer, Telemetry};

#[derive(Parser)]
#[command(name = "trace-proxy")]
#[command(about = "Reverse proxy that traces every request by client address", long_about = None)]
struct Cli {
    /// Listen address (e.g. ":8080").
    #[arg(long)]
    listen: Option<String>,

    /// Backend address to forward to (host:port).
    #[arg(long)]
    forward: Option<String>,

    /// Optional TOML configuration file; flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Do not export spans.
    #[arg(long)]
    no_otel: bool,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(forward) = self.forward {
            config.forward.address = forward;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if self.no_otel {
            config.observability.otel_enabled = false;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    init_logging(&config.observability)?;

    tracing::info!(
        listen = %config.listener.bind_address,
        forward = %config.forward.address,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "trace-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Tracing must be up before the first request: trace ids depend on it.
    let telemetry = Telemetry::init(&config.observability)?;

    let listener = TcpListener::bind(config.listener.socket_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let drain_deadline = config.timeouts.shutdown();
    let server = HttpServer::new(config, telemetry.tracer());
    let mut server_task = tokio::spawn(server.run(listener, shutdown.signalled()));

    let served = tokio::select! {
        result = &mut server_task => result,
        _ = shutdown_signal() => {
            shutdown.trigger();
            match tokio::time::timeout(drain_deadline, &mut server_task).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        deadline_secs = drain_deadline.as_secs(),
                        "Drain deadline exceeded, abandoning in-flight requests"
                    );
                    server_task.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    if let Err(e) = telemetry.shutdown() {
        tracing::error!(error = %e, "Failed to flush spans");
    }

    served??;
    tracing::info!("Shutdown complete");
    Ok(())
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single backend every request is forwarded to.
    pub forward: ForwardConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logging and trace export settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., ":8080" or "127.0.0.1:8080").
    pub bind_address: String,

    /// Largest request head accepted, in bytes; larger heads get a 431.
    pub max_header_bytes: usize,
}

impl ListenerConfig {
    /// Address to hand to the socket layer.
    ///
    /// A bare `:port` binds every interface.
    pub fn socket_address(&self) -> String {
        if self.bind_address.starts_with(':') {
            format!("0.0.0.0{}", self.bind_address)
        } else {
            self.bind_address.clone()
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8080".to_string(),
            max_header_bytes: 1 << 20,
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Backend authority, `host:port`, spoken to over plain HTTP.
    pub address: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8000".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
///
/// The inbound side is bounded per connection, never per request, so a slow
/// backend always surfaces through `upstream_secs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a client to send a complete request head, in seconds.
    pub header_read_secs: u64,

    /// Time a response write may stay blocked on the client, in seconds.
    pub write_secs: u64,

    /// Time a keep-alive connection may sit with no request, in seconds.
    pub idle_secs: u64,

    /// Time allowed for the backend to answer, in seconds.
    pub upstream_secs: u64,

    /// Time allowed to drain in-flight requests on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl TimeoutConfig {
    pub fn header_read(&self) -> Duration {
        Duration::from_secs(self.header_read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_read_secs: 30,
            write_secs: 30,
            idle_secs: 120,
            upstream_secs: 30,
            shutdown_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Export spans over OTLP. When disabled spans are still created but dropped.
    pub otel_enabled: bool,

    /// Service name override; discovered from the environment when unset.
    pub service_name: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            otel_enabled: true,
            service_name: None,
        }
    }
}

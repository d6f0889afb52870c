//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → id.rs (trace id from client address, random span ids)
//!     → span.rs (one "proxy" span per request, ended exactly once)
//!
//! Startup/shutdown:
//!     → logging.rs (structured log events)
//!     → telemetry.rs (tracer provider + OTLP exporter)
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing`; spans via OpenTelemetry directly
//! - Trace ids are derived from the client, so one client is one trace

pub mod id;
pub mod logging;
pub mod span;
pub mod telemetry;

pub use span::{AttrValue, Attributes, ProxySpan};
pub use telemetry::{Telemetry, TelemetryError};

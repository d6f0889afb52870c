//! Traced single-backend reverse proxy.
//!
//! Every request is forwarded to one backend and wrapped in a "proxy" span
//! whose trace id is derived from the client address, so all requests from
//! one client correlate into a single trace.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Telemetry;

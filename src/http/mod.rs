//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → net/ (connection limits, idle close, drain)
//!     → server.rs (Axum setup, forwarding handler)
//!     → identity.rs (choose client address → trace id)
//!     → request.rs (outbound request on the backend)
//!     → backend
//!     → response.rs (status + headers + streamed body, span closes)
//!     → Send to client
//! ```

pub mod identity;
pub mod request;
pub mod response;
pub mod server;

pub use identity::{extract_identity, ClientIdentity, CLIENT_ADDR_HEADERS};
pub use server::{AppState, HttpServer, HTTP_STATUS_CODE, PROXY_SPAN_NAME};

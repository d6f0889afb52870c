//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → io.rs (activity tracking, stalled-write deadline)
//!     → connection.rs (HTTP/1 + HTTP/2 serving, idle watchdog, drain)
//!     → Hand off to the router
//!
//! Connection States:
//!     Active → Idle → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Inbound limits apply to the connection, never to a single request, so
//!   the forwarding handler alone decides how long a backend may take
//! - A connection counts as idle only with no request in flight
//! - Each connection holds a drain receiver; shutdown waits for all of them

pub mod connection;
pub mod io;

pub use connection::{serve_connection, ConnectionActivity, ConnectionSettings};
pub use io::TrackedIo;

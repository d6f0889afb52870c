//! Per-request error taxonomy.
//!
//! None of these unwind past the request boundary: the forwarding handler
//! records them on the request span and answers the client itself.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while forwarding a single request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The outbound request could not be constructed (bad authority, URI, ...).
    #[error("error creating request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    /// The backend could not be reached or the exchange failed before a response.
    #[error("error forwarding request: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The backend did not answer within the configured upstream timeout.
    #[error("error forwarding request: no response within {0:?}")]
    UpstreamTimeout(Duration),

    /// The response body was dropped before it was fully relayed.
    #[error("error copying response: body dropped before completion")]
    BodyAborted,
}

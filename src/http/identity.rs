//! Client identity extraction.
//!
//! # Responsibilities
//! - Pick the client address a request should be attributed to
//! - Keep every candidate address as a span attribute
//!
//! # Design Decisions
//! - Fixed header priority: CDN headers first, then the generic proxy headers
//! - Values are taken raw; an `X-Forwarded-For` list is kept as sent
//! - Falls back to the socket peer address, so a value is always chosen

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::{header, HeaderMap};

use crate::observability::span::{AttrValue, Attributes};

/// Headers that may carry the client address, highest priority first.
pub const CLIENT_ADDR_HEADERS: [&str; 5] = [
    "CF-Pseudo-IPv4",
    "CF-Connecting-IP",
    "CF-Connecting-IPv6",
    "X-Forwarded-For",
    "X-Real-IP",
];

/// `addr.chosen` value when no header carried an address.
pub const CHOSEN_REMOTE_ADDR: &str = "remote_addr";

/// The address a request is attributed to, plus every candidate examined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub attributes: BTreeMap<String, String>,
    pub chosen: String,
}

impl ClientIdentity {
    /// Name of the source that won (`addr.chosen`).
    pub fn chosen_source(&self) -> &str {
        self.attributes
            .get("addr.chosen")
            .map(String::as_str)
            .unwrap_or(CHOSEN_REMOTE_ADDR)
    }

    pub fn span_attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), AttrValue::from(v)))
            .collect()
    }
}

/// Derive the client identity from request headers and the peer address.
pub fn extract_identity(headers: &HeaderMap, remote_addr: SocketAddr) -> ClientIdentity {
    let remote_addr = remote_addr.to_string();

    let mut attributes = BTreeMap::new();
    attributes.insert("addr.remote_addr".to_string(), remote_addr.clone());
    attributes.insert(
        "http.user_agent".to_string(),
        header_value(headers, header::USER_AGENT.as_str()),
    );
    attributes.insert(
        "http.referer".to_string(),
        header_value(headers, header::REFERER.as_str()),
    );
    attributes.insert("addr.chosen".to_string(), CHOSEN_REMOTE_ADDR.to_string());

    let mut chosen = None;
    for name in CLIENT_ADDR_HEADERS {
        let value = header_value(headers, name);
        if chosen.is_none() && !value.is_empty() {
            chosen = Some(value.clone());
            attributes.insert("addr.chosen".to_string(), name.to_string());
        }
        attributes.insert(format!("addr.{}", name.to_lowercase()), value);
    }

    ClientIdentity {
        attributes,
        chosen: chosen.unwrap_or(remote_addr),
    }
}

/// First value of `name`, or empty if absent or not visible ASCII.
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

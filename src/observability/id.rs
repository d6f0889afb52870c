//! Trace and span identifier generation.
//!
//! Trace ids are an MD5 digest of the chosen client address, so every span
//! from one client lands in the same trace, across restarts and across
//! instances. Span ids come from the same digest over a random seed.

use std::fmt;

use md5::{Digest, Md5};
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;

/// Size of a generated identifier (one MD5 digest).
pub const ID_LEN: usize = 16;

/// Generate an identifier from `inputs`.
///
/// Inputs are serialized by concatenating their `Display` output and hashed.
/// With no inputs a random non-negative 63-bit integer is hashed instead.
pub fn new_id(inputs: &[&dyn fmt::Display]) -> [u8; ID_LEN] {
    let serialized: String = if inputs.is_empty() {
        (rand::random::<i64>() & i64::MAX).to_string()
    } else {
        inputs.iter().map(|input| input.to_string()).collect()
    };

    let digest = Md5::digest(serialized.as_bytes());
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&digest);
    id
}

/// Deterministic trace id for a client address.
pub fn trace_id_for(chosen: &str) -> TraceId {
    TraceId::from_bytes(new_id(&[&chosen]))
}

/// Random trace id.
pub fn random_trace_id() -> TraceId {
    TraceId::from_bytes(new_id(&[]))
}

/// Random span id (the first 8 bytes of a random identifier).
pub fn random_span_id() -> SpanId {
    let data = new_id(&[]);
    let mut span = [0u8; 8];
    span.copy_from_slice(&data[..8]);
    SpanId::from_bytes(span)
}

/// Id generator installed on the tracer provider.
///
/// Used for spans that are not explicitly seeded with a trace id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyIdGenerator;

impl IdGenerator for ProxyIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        random_trace_id()
    }

    fn new_span_id(&self) -> SpanId {
        random_span_id()
    }
}

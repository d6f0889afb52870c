//! Span wrapper used by the forwarding handler.
//!
//! # Responsibilities
//! - Open a span as a child of the parent context, or as a root seeded with
//!   an explicit trace id
//! - Convert loosely typed attribute maps into OpenTelemetry attributes
//! - Record errors without ending the span
//! - End the span exactly once, on every exit path
//!
//! # Design Decisions
//! - `ProxySpan` ends itself on drop, so an early return can never leak an
//!   open span; an explicit `end()` followed by the drop is a no-op
//! - Attribute values are an explicit enum; values with no OpenTelemetry
//!   counterpart are dropped instead of failing

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use axum::http::StatusCode;
use opentelemetry::trace::{SpanContext, TraceContextExt, TraceId, Tracer};
use opentelemetry::{Context, Key, KeyValue, Value};

use crate::observability::id;

/// Attribute map accepted by [`ProxySpan`].
pub type Attributes = BTreeMap<String, AttrValue>;

/// A span attribute value before conversion.
#[derive(Debug, Clone)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    /// Recorded as the error's message.
    Error(Arc<dyn Error + Send + Sync>),
    /// No attribute representation; silently dropped.
    Unsupported,
}

impl AttrValue {
    /// Wrap an error so it is recorded as its message.
    pub fn error<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Error(Arc::new(err))
    }

    /// Convert to an OpenTelemetry value, or `None` if the value is dropped.
    pub fn to_otel(&self) -> Option<Value> {
        match self {
            AttrValue::String(s) => Some(Value::from(s.clone())),
            AttrValue::Int(i) => Some(Value::I64(*i)),
            // Attributes have no unsigned type; values above i64::MAX wrap.
            AttrValue::Uint(u) => Some(Value::I64(*u as i64)),
            AttrValue::Float(f) => Some(Value::F64(*f)),
            AttrValue::Bool(b) => Some(Value::Bool(*b)),
            AttrValue::Error(err) => Some(Value::from(err.to_string())),
            AttrValue::Unsupported => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<&String> for AttrValue {
    fn from(v: &String) -> Self {
        AttrValue::String(v.clone())
    }
}

impl From<StatusCode> for AttrValue {
    fn from(status: StatusCode) -> Self {
        AttrValue::Int(i64::from(status.as_u16()))
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Unsupported)
    }
}

macro_rules! attr_from {
    ($variant:ident, $target:ty; $($t:ty),*) => {
        $(
            impl From<$t> for AttrValue {
                fn from(v: $t) -> Self {
                    AttrValue::$variant(v as $target)
                }
            }

            impl From<&$t> for AttrValue {
                fn from(v: &$t) -> Self {
                    AttrValue::$variant(*v as $target)
                }
            }
        )*
    };
}

attr_from!(Int, i64; i8, i16, i32, i64, isize);
attr_from!(Uint, u64; u8, u16, u32, u64, usize);
attr_from!(Float, f64; f32, f64);
attr_from!(Bool, bool; bool);

/// Merge attribute maps into OpenTelemetry key/values.
///
/// Later maps win on key collisions; unsupported values are dropped.
pub fn to_key_values<'a>(maps: impl IntoIterator<Item = &'a Attributes>) -> Vec<KeyValue> {
    let mut merged: BTreeMap<&str, &AttrValue> = BTreeMap::new();
    for map in maps {
        for (key, value) in map {
            merged.insert(key.as_str(), value);
        }
    }

    merged
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .to_otel()
                .map(|v| KeyValue::new(Key::new(key.to_string()), v))
        })
        .collect()
}

/// One traced unit of work.
pub struct ProxySpan {
    cx: Context,
    ended: bool,
}

impl ProxySpan {
    /// Start a span named `name`.
    ///
    /// If `parent` carries an active span the new span is its child and
    /// inherits its trace id; otherwise the span is a root of `trace_id`.
    pub fn start<'a, T>(
        tracer: &T,
        parent: &Context,
        name: impl Into<Cow<'static, str>>,
        trace_id: TraceId,
        attributes: impl IntoIterator<Item = &'a Attributes>,
    ) -> Self
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        let span = tracer
            .span_builder(name)
            .with_trace_id(trace_id)
            .with_span_id(id::random_span_id())
            .with_attributes(to_key_values(attributes))
            .start_with_context(tracer, parent);

        Self {
            cx: parent.with_span(span),
            ended: false,
        }
    }

    /// Context carrying this span, for nesting further spans.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    pub fn set_attributes<'a>(&self, maps: impl IntoIterator<Item = &'a Attributes>) {
        self.cx.span().set_attributes(to_key_values(maps));
    }

    /// Attach `err` to the span. Does not end the span.
    pub fn record_error<E: Error>(&self, err: Option<&E>) {
        if let Some(err) = err {
            self.cx.span().record_error(err);
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Finish the span; later calls are no-ops.
    pub fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.cx.span().end();
        }
    }
}

impl Drop for ProxySpan {
    fn drop(&mut self) {
        self.end();
    }
}

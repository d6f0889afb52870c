//! Distributed tracing bootstrap.
//!
//! # Responsibilities
//! - Build the tracer provider and OTLP exporter once, at startup
//! - Register the W3C trace-context and baggage propagators
//! - Discover the service name from the standard OTel environment
//! - Flush and shut down the provider on exit
//!
//! # Design Decisions
//! - The tracer is an owned handle passed to the HTTP server, not a global
//! - Exporter endpoint and transport settings come from the usual
//!   `OTEL_EXPORTER_OTLP_*` variables
//! - With export disabled spans are still built, so trace ids are identical
//!   either way

use std::env;

use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{ExporterBuildError, SpanExporter};
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use thiserror::Error;

use crate::config::ObservabilityConfig;
use crate::observability::id::ProxyIdGenerator;

/// Service name used when the environment names none.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Errors from logging and tracing setup. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build span exporter: {0}")]
    Exporter(#[from] ExporterBuildError),

    #[error("failed to shut down tracer provider: {0}")]
    Shutdown(#[from] OTelSdkError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Owned tracing pipeline: init → use → shutdown.
pub struct Telemetry {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl Telemetry {
    /// Build the pipeline described by `settings`.
    pub fn init(settings: &ObservabilityConfig) -> Result<Self, TelemetryError> {
        let service_name = settings
            .service_name
            .clone()
            .unwrap_or_else(discover_service_name);

        let resource = Resource::builder()
            .with_service_name(service_name.clone())
            .build();

        let mut builder = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_id_generator(ProxyIdGenerator);
        if settings.otel_enabled {
            let exporter = SpanExporter::builder().with_tonic().build()?;
            builder = builder.with_batch_exporter(exporter);
        }

        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));

        tracing::info!(
            service.name = %service_name,
            otel.enabled = settings.otel_enabled,
            "Tracing initialized"
        );

        Ok(Self::from_provider(builder.build(), service_name))
    }

    /// Wrap an already built provider.
    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<String>) -> Self {
        let tracer = provider.tracer(service_name.into());
        Self { provider, tracer }
    }

    pub fn tracer(&self) -> SdkTracer {
        self.tracer.clone()
    }

    /// Flush pending spans and stop the exporter.
    pub fn shutdown(self) -> Result<(), TelemetryError> {
        self.provider.shutdown()?;
        Ok(())
    }
}

/// Service name from `OTEL_SERVICE_NAME` or `OTEL_RESOURCE_ATTRIBUTES`.
pub fn discover_service_name() -> String {
    service_name_from(
        env::var("OTEL_SERVICE_NAME").ok().as_deref(),
        env::var("OTEL_RESOURCE_ATTRIBUTES").ok().as_deref(),
    )
}

/// Resolve the service name from the raw variable values.
///
/// The explicit name wins; otherwise the last `service.name=` entry of the
/// resource attributes (key matched case-insensitively); otherwise
/// [`UNKNOWN_SERVICE`].
pub fn service_name_from(service_name: Option<&str>, resource_attributes: Option<&str>) -> String {
    if let Some(name) = service_name.filter(|name| !name.is_empty()) {
        return name.to_string();
    }

    resource_attributes
        .unwrap_or_default()
        .split(',')
        .filter_map(|pair| {
            let mut kv = pair.split('=');
            match (kv.next(), kv.next(), kv.next()) {
                (Some(key), Some(value), None) if key.eq_ignore_ascii_case("service.name") => {
                    Some(value)
                }
                _ => None,
            }
        })
        .filter(|value| !value.is_empty())
        .last()
        .unwrap_or(UNKNOWN_SERVICE)
        .to_string()
}

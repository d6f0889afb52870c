//! Structured logging.
//!
//! `RUST_LOG` takes precedence over the configured level. Pretty output for
//! development, JSON for log aggregation.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::observability::telemetry::TelemetryError;

/// Install the global log subscriber.
pub fn init_logging(settings: &ObservabilityConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log_level)?,
    };

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()?,
    }

    Ok(())
}

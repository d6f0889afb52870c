//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend address is a usable URI authority
//! - Validate value ranges (timeouts > 0, header limit >= 8 KiB)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest request head limit the HTTP/1 connection accepts.
pub const MIN_HEADER_BYTES: usize = 8 * 1024;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address must not be empty")]
    EmptyBindAddress,

    #[error("forward.address {address:?} is not a valid host:port ({reason})")]
    InvalidForwardAddress { address: String, reason: String },

    #[error("listener.max_header_bytes must be at least {MIN_HEADER_BYTES}, got {0}")]
    HeaderLimitTooSmall(usize),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::EmptyBindAddress);
    }

    if config.listener.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::HeaderLimitTooSmall(
            config.listener.max_header_bytes,
        ));
    }

    let address = &config.forward.address;
    match address.parse::<Authority>() {
        Ok(authority) if authority.as_str().contains('@') => {
            errors.push(ValidationError::InvalidForwardAddress {
                address: address.clone(),
                reason: "credentials are not supported".to_string(),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidForwardAddress {
            address: address.clone(),
            reason: e.to_string(),
        }),
    }

    for (name, secs) in [
        ("header_read_secs", config.timeouts.header_read_secs),
        ("write_secs", config.timeouts.write_secs),
        ("idle_secs", config.timeouts.idle_secs),
        ("upstream_secs", config.timeouts.upstream_secs),
        ("shutdown_secs", config.timeouts.shutdown_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = " ".to_string();
        config.listener.max_header_bytes = 1024;
        config.forward.address = "not a host".to_string();
        config.timeouts.idle_secs = 0;
        config.timeouts.upstream_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0], ValidationError::EmptyBindAddress);
        assert_eq!(errors[1], ValidationError::HeaderLimitTooSmall(1024));
        assert!(matches!(errors[2], ValidationError::InvalidForwardAddress { .. }));
        assert_eq!(errors[3], ValidationError::ZeroTimeout("idle_secs"));
        assert_eq!(errors[4], ValidationError::ZeroTimeout("upstream_secs"));
    }

    #[test]
    fn test_forward_address_forms() {
        for ok in ["localhost:8000", "10.0.0.1:80", "[::1]:8000", "backend"] {
            let mut config = ProxyConfig::default();
            config.forward.address = ok.to_string();
            assert!(validate_config(&config).is_ok(), "{ok} should be accepted");
        }

        let mut config = ProxyConfig::default();
        config.forward.address = "user:pw@backend:80".to_string();
        assert!(validate_config(&config).is_err());
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, delays ordered, multiplier >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ClientConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("beacon_address must not be empty")]
    EmptyBeaconAddress,

    #[error("request_timeout_ms must be greater than 0")]
    ZeroRequestTimeout,

    #[error("reconnection.max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("reconnection.base_delay_ms must be greater than 0")]
    ZeroBaseDelay,

    #[error("reconnection.max_delay_ms ({max}) is below base_delay_ms ({base})")]
    MaxDelayBelowBase { base: u64, max: u64 },

    #[error("reconnection.backoff_multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.beacon_address.trim().is_empty() {
        errors.push(ValidationError::EmptyBeaconAddress);
    }
    if config.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let reconnection = &config.reconnection;
    if reconnection.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if reconnection.base_delay_ms == 0 {
        errors.push(ValidationError::ZeroBaseDelay);
    }
    if reconnection.max_delay_ms < reconnection.base_delay_ms {
        errors.push(ValidationError::MaxDelayBelowBase {
            base: reconnection.base_delay_ms,
            max: reconnection.max_delay_ms,
        });
    }
    if !reconnection.backoff_multiplier.is_finite() || reconnection.backoff_multiplier < 1.0 {
        errors.push(ValidationError::InvalidMultiplier(reconnection.backoff_multiplier));
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
    fn test_valid_config() {
        assert!(validate_config(&ClientConfig::new("beacon")).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::default();
        config.request_timeout_ms = 0;
        config.reconnection.max_attempts = 0;
        config.reconnection.base_delay_ms = 500;
        config.reconnection.max_delay_ms = 100;
        config.reconnection.backoff_multiplier = 0.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyBeaconAddress,
                ValidationError::ZeroRequestTimeout,
                ValidationError::ZeroMaxAttempts,
                ValidationError::MaxDelayBelowBase { base: 500, max: 100 },
                ValidationError::InvalidMultiplier(0.5),
            ]
        );
    }

    #[test]
    fn test_rejects_nan_multiplier() {
        let mut config = ClientConfig::new("beacon");
        config.reconnection.backoff_multiplier = f64::NAN;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::InvalidMultiplier(_)));
    }
}

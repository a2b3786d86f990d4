//! Startup configuration validation.
//!
//! Invalid configuration is a `ConfigurationError` per spec §7: fatal,
//! caught before the poller or subscription hub ever start.

use super::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("secret_key must not be the development default in a non-dev deployment")]
    InsecureSecret,

    #[error("listen_addr '{0}' is not a valid host:port")]
    InvalidListenAddr(String),
}

/// Validate an `EngineConfig` at startup. Returns all violations found
/// rather than bailing on the first one, so operators see the full list.
pub fn validate(cfg: &EngineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if cfg.poll_interval_ms == 0 {
        errors.push(ConfigError::NotPositive {
            field: "poll_interval_ms",
            value: 0,
        });
    }
    if cfg.oee_window_minutes <= 0 {
        errors.push(ConfigError::NotPositive {
            field: "oee_window_minutes",
            value: cfg.oee_window_minutes,
        });
    }
    if cfg.driver_timeout_ms == 0 {
        errors.push(ConfigError::NotPositive {
            field: "driver_timeout_ms",
            value: 0,
        });
    }
    if !cfg.listen_addr.contains(':') {
        errors.push(ConfigError::InvalidListenAddr(cfg.listen_addr.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Engine configuration
//!
//! Loaded once at startup from environment variables (with an optional TOML
//! file for static line/andon-threshold config) and read thereafter via
//! `config::get()`.
//!
//! ## Loading order
//!
//! 1. `FLOORLINE_CONFIG` environment variable (path to a TOML file)
//! 2. `floorline.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! config::init(EngineConfig::from_env());
//! let window = config::get().oee_window_minutes;
//! ```

pub mod defaults;
mod andon_thresholds;
mod validation;

pub use andon_thresholds::{AndonCategory, AndonCategoryConfig, AndonThresholds};
pub use validation::{validate, ConfigError};

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration. Must be called exactly once
/// before any call to `get()`.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}

/// Top-level engine configuration (spec §6 "CLI / environment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for the durable sled-backed store.
    pub data_dir: String,
    /// Bearer-token signing secret for the subscription hub (§4.8).
    pub secret_key: String,
    /// HTTP/WebSocket listen address.
    pub listen_addr: String,
    /// Poller tick interval in milliseconds (default 1000, one tick/sec/line).
    pub poll_interval_ms: u64,
    /// Real-time OEE rolling window in minutes.
    pub oee_window_minutes: i64,
    /// Path to the fault catalog TOML file.
    pub fault_catalog_path: String,
    /// Per-priority Andon escalation timeouts and per-category thresholds.
    pub andon_thresholds: AndonThresholds,
    /// Consecutive driver failures before a PLC_FAULT downtime is synthesized.
    pub driver_failure_threshold: u32,
    /// Device-read timeout in milliseconds.
    pub driver_timeout_ms: u64,
    /// Per-connection outbound send queue capacity.
    pub send_queue_capacity: usize,
    /// Event Bus per-subscriber queue capacity.
    pub bus_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            secret_key: "dev-secret-change-me".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            poll_interval_ms: defaults::TICK_INTERVAL.as_millis() as u64,
            oee_window_minutes: defaults::DEFAULT_OEE_WINDOW_MINUTES,
            fault_catalog_path: "./fault_catalog.toml".to_string(),
            andon_thresholds: AndonThresholds::default(),
            driver_failure_threshold: defaults::DEFAULT_DRIVER_FAILURE_THRESHOLD,
            driver_timeout_ms: defaults::DEFAULT_DRIVER_TIMEOUT.as_millis() as u64,
            send_queue_capacity: defaults::DEFAULT_SEND_QUEUE_CAPACITY,
            bus_queue_capacity: defaults::DEFAULT_BUS_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Build configuration from environment variables, falling back to a
    /// TOML file (`FLOORLINE_CONFIG` or `./floorline.toml`) for fields not
    /// overridden, and finally to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::from_toml_file().unwrap_or_default();

        if let Ok(v) = std::env::var("FLOORLINE_DATA_DIR") {
            cfg.data_dir = v;
        }
        if let Ok(v) = std::env::var("FLOORLINE_SECRET_KEY") {
            cfg.secret_key = v;
        }
        if let Ok(v) = std::env::var("FLOORLINE_LISTEN_ADDR") {
            cfg.listen_addr = v;
        }
        if let Ok(v) = std::env::var("FLOORLINE_POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                cfg.poll_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("FLOORLINE_OEE_WINDOW_MINUTES") {
            if let Ok(n) = v.parse() {
                cfg.oee_window_minutes = n;
            }
        }
        if let Ok(v) = std::env::var("FLOORLINE_FAULT_CATALOG_PATH") {
            cfg.fault_catalog_path = v;
        }
        if let Ok(v) = std::env::var("FLOORLINE_DRIVER_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                cfg.driver_failure_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("FLOORLINE_DRIVER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                cfg.driver_timeout_ms = n;
            }
        }

        cfg
    }

    fn from_toml_file() -> Option<Self> {
        let path = std::env::var("FLOORLINE_CONFIG").unwrap_or_else(|_| "floorline.toml".to_string());
        let contents = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path, "Loaded engine config from TOML");
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to parse engine config TOML, using defaults");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert_eq!(cfg.oee_window_minutes, 60);
        assert_eq!(cfg.driver_failure_threshold, 3);
    }
}

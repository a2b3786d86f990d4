//! Top-level error taxonomy for the telemetry engine.
//!
//! Each component owns a local `thiserror` enum for its own failure modes
//! (see `acquisition::DriverError`, `storage::PersistenceError`,
//! `andon::AndonError`, ...); this type is the common currency they convert
//! into at component boundaries; see spec §7.

use thiserror::Error;

/// Engine-wide error kinds. Variants map directly onto the error taxonomy
/// of spec §7 ("ERROR HANDLING DESIGN").
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid environment or fault-catalog at start-up. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Device driver did not respond within the configured timeout.
    #[error("driver timeout reading {equipment_code} after {timeout_ms}ms")]
    DriverTimeout {
        equipment_code: String,
        timeout_ms: u64,
    },

    /// Device driver is unreachable (connection refused, DNS failure, etc).
    #[error("driver unavailable for {equipment_code}: {reason}")]
    DriverUnavailable {
        equipment_code: String,
        reason: String,
    },

    /// Malformed client message or API input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Attempted state transition forbidden by an invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced id is unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal invariant violated at runtime. The operation aborts but the
    /// engine stays up.
    #[error("business logic error: {0}")]
    BusinessLogic(String),

    /// A persistence operation failed after exhausting retries.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn business_logic(msg: impl Into<String>) -> Self {
        Self::BusinessLogic(msg.into())
    }

    /// Whether the caller may retry after re-reading current state
    /// (ConflictError / NotFoundError per spec §7).
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

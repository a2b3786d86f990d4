//! Named constants for engine defaults.
//!
//! Centralized here so thresholds are operator-tunable in one place and
//! never hardcoded at the call site, mirroring the teacher's
//! `config/defaults.rs`.

use std::time::Duration;

/// Poller tick period (spec §4.9: "one tick per second per line").
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Fraction of the tick budget after which the poller logs a performance
/// warning (spec §4.9: "0.8s out of 1.0s").
pub const TICK_BUDGET_WARN_FRACTION: f64 = 0.8;

/// Default real-time OEE window in minutes (spec §4.9).
pub const DEFAULT_OEE_WINDOW_MINUTES: i64 = 60;

/// Default device-read timeout (spec §5).
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive driver failures before a PLC_FAULT downtime is synthesized
/// (spec §7, "N configurable, default 3").
pub const DEFAULT_DRIVER_FAILURE_THRESHOLD: u32 = 3;

/// `running := tag(running_bit) && speed > SPEED_EPSILON` (spec §4.1).
pub const RUNNING_SPEED_EPSILON: f64 = 0.1;

/// Tolerance for OEE product-equals-components check (spec §3).
pub const OEE_EPSILON: f64 = 1e-4;

/// Default per-connection outbound send queue depth (spec §5, §4.8).
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 1000;

/// Default Event Bus per-subscriber queue high-water mark (spec §4.7).
pub const DEFAULT_BUS_QUEUE_CAPACITY: usize = 1000;

/// Heartbeat interval; connections idle for 2x this are closed (spec §4.8).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Quality rate below which the Poller raises a `QualityAlert` and buckets
/// the tick's fault analysis under the `quality` Andon category (spec §4.6
/// names the category but leaves its trigger condition to the
/// implementation; chosen here as a round, conservative figure).
pub const QUALITY_ALERT_THRESHOLD: f64 = 0.95;

/// Rolling window length for the Poller's tick-duration introspection
/// (spec §4.9 "a rolling window of the last K tick durations").
pub const TICK_DURATION_WINDOW: usize = 120;

/// Transient persistence retry policy (spec §7): 3 attempts, 100ms base.
pub const PERSISTENCE_RETRY_ATTEMPTS: u32 = 3;
pub const PERSISTENCE_RETRY_BASE: Duration = Duration::from_millis(100);

/// Acknowledgment/resolution timeouts per Andon priority (spec §4.6).
pub const ACK_TIMEOUT_LOW: Duration = Duration::from_secs(15 * 60);
pub const ACK_TIMEOUT_MEDIUM: Duration = Duration::from_secs(10 * 60);
pub const ACK_TIMEOUT_HIGH: Duration = Duration::from_secs(5 * 60);
pub const ACK_TIMEOUT_CRITICAL: Duration = Duration::from_secs(2 * 60);

pub const RESOLUTION_TIMEOUT_LOW: Duration = Duration::from_secs(60 * 60);
pub const RESOLUTION_TIMEOUT_MEDIUM: Duration = Duration::from_secs(45 * 60);
pub const RESOLUTION_TIMEOUT_HIGH: Duration = Duration::from_secs(30 * 60);
pub const RESOLUTION_TIMEOUT_CRITICAL: Duration = Duration::from_secs(15 * 60);

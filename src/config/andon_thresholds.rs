//! Per-category Andon thresholds and per-priority escalation timeouts
//! (spec §4.6).

use crate::config::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fault category a tick's fault analysis is bucketed into (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AndonCategory {
    Critical,
    High,
    Medium,
    Low,
    Upstream,
    Downstream,
    Material,
    Quality,
}

impl AndonCategory {
    pub const ALL: [AndonCategory; 8] = [
        AndonCategory::Critical,
        AndonCategory::High,
        AndonCategory::Medium,
        AndonCategory::Low,
        AndonCategory::Upstream,
        AndonCategory::Downstream,
        AndonCategory::Material,
        AndonCategory::Quality,
    ];
}

/// One row of the category threshold table (spec §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AndonCategoryConfig {
    pub enabled: bool,
    pub min_faults: usize,
    pub escalate_after: Duration,
    pub priority: crate::andon::AndonPriority,
}

/// The full per-category table plus the per-priority escalation timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AndonThresholds {
    pub critical: AndonCategoryConfig,
    pub high: AndonCategoryConfig,
    pub medium: AndonCategoryConfig,
    pub low: AndonCategoryConfig,
    pub upstream: AndonCategoryConfig,
    pub downstream: AndonCategoryConfig,
    pub material: AndonCategoryConfig,
    pub quality: AndonCategoryConfig,
}

impl AndonThresholds {
    pub fn get(&self, category: AndonCategory) -> AndonCategoryConfig {
        match category {
            AndonCategory::Critical => self.critical,
            AndonCategory::High => self.high,
            AndonCategory::Medium => self.medium,
            AndonCategory::Low => self.low,
            AndonCategory::Upstream => self.upstream,
            AndonCategory::Downstream => self.downstream,
            AndonCategory::Material => self.material,
            AndonCategory::Quality => self.quality,
        }
    }

    /// Acknowledgment-timeout for a priority level (spec §4.6).
    pub fn ack_timeout(priority: crate::andon::AndonPriority) -> Duration {
        use crate::andon::AndonPriority::*;
        match priority {
            Low => defaults::ACK_TIMEOUT_LOW,
            Medium => defaults::ACK_TIMEOUT_MEDIUM,
            High => defaults::ACK_TIMEOUT_HIGH,
            Critical => defaults::ACK_TIMEOUT_CRITICAL,
        }
    }

    /// Resolution-timeout for a priority level (spec §4.6).
    pub fn resolution_timeout(priority: crate::andon::AndonPriority) -> Duration {
        use crate::andon::AndonPriority::*;
        match priority {
            Low => defaults::RESOLUTION_TIMEOUT_LOW,
            Medium => defaults::RESOLUTION_TIMEOUT_MEDIUM,
            High => defaults::RESOLUTION_TIMEOUT_HIGH,
            Critical => defaults::RESOLUTION_TIMEOUT_CRITICAL,
        }
    }
}

impl Default for AndonThresholds {
    fn default() -> Self {
        use crate::andon::AndonPriority;
        Self {
            critical: AndonCategoryConfig {
                enabled: true,
                min_faults: 1,
                escalate_after: Duration::from_secs(2 * 60),
                priority: AndonPriority::Critical,
            },
            high: AndonCategoryConfig {
                enabled: true,
                min_faults: 1,
                escalate_after: Duration::from_secs(5 * 60),
                priority: AndonPriority::High,
            },
            medium: AndonCategoryConfig {
                enabled: true,
                min_faults: 2,
                escalate_after: Duration::from_secs(15 * 60),
                priority: AndonPriority::Medium,
            },
            low: AndonCategoryConfig {
                enabled: false,
                min_faults: 0,
                escalate_after: Duration::from_secs(0),
                priority: AndonPriority::Low,
            },
            upstream: AndonCategoryConfig {
                enabled: false,
                min_faults: 0,
                escalate_after: Duration::from_secs(0),
                priority: AndonPriority::Medium,
            },
            downstream: AndonCategoryConfig {
                enabled: false,
                min_faults: 0,
                escalate_after: Duration::from_secs(0),
                priority: AndonPriority::Medium,
            },
            material: AndonCategoryConfig {
                enabled: true,
                min_faults: 1,
                escalate_after: Duration::from_secs(20 * 60),
                priority: AndonPriority::Medium,
            },
            quality: AndonCategoryConfig {
                enabled: true,
                min_faults: 1,
                escalate_after: Duration::from_secs(30 * 60),
                priority: AndonPriority::Medium,
            },
        }
    }
}

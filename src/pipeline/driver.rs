//! Device Driver (C1, external) — spec §4.9 step 1, §5 "Device driver
//! interface".
//!
//! The spec treats the PLC wire protocol as explicitly out of scope (§1
//! Non-goals: "it does not define the PLC wire protocol; a pluggable
//! device driver is assumed"). `DeviceDriver` is the seam a real
//! implementation plugs into, mirroring the `RecipientDirectory` /
//! `JobCatalog` / `TokenVerifier` external-collaborator pattern used
//! elsewhere in this crate. `SimulatedDriver` is the one concrete
//! implementation this crate ships, for local development and the
//! `plc-simulator` binary; it stands in for the unshipped real driver the
//! same way `NullCatalog`/`PermissiveVerifier` stand in for theirs.

use crate::faults::FixedBitVec;
use crate::ids::EquipmentCode;
use crate::telemetry::{CommunicationStatus, RawSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver timeout reading {0} after {1}ms")]
    Timeout(EquipmentCode, u64),
    #[error("driver unavailable for {0}: {1}")]
    Unavailable(EquipmentCode, String),
}

/// The pluggable read contract (spec §5): "synchronous from the poller's
/// point of view (the runtime may implement it asynchronously)". Modeled
/// here as an async trait so a real implementation may suspend on I/O;
/// the poller awaits it per spec §5 ("Device-driver reads ... may
/// suspend").
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn read_all_tags(&self, equipment_code: &EquipmentCode, now: DateTime<Utc>) -> Result<RawSnapshot, DriverError>;
}

#[derive(Debug, Clone)]
struct SimState {
    product_count: u64,
    good_parts: u64,
    total_parts: u64,
    running: bool,
    target_speed: f64,
    ticks_until_fault_clears: u32,
    active_fault_bit: Option<usize>,
}

impl SimState {
    fn fresh(target_speed: f64) -> Self {
        Self {
            product_count: 0,
            good_parts: 0,
            total_parts: 0,
            running: true,
            target_speed,
            ticks_until_fault_clears: 0,
            active_fault_bit: None,
        }
    }
}

/// Generates plausible PLC tag data for a fixed set of equipment, with
/// occasional randomized faults. Deterministic in shape, not in value —
/// suitable for exercising the full C1-C9 pipeline without real hardware.
pub struct SimulatedDriver {
    states: DashMap<EquipmentCode, SimState>,
    fault_rate: f64,
    reject_rate: f64,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            fault_rate: 0.01,
            reject_rate: 0.03,
        }
    }

    pub fn with_rates(fault_rate: f64, reject_rate: f64) -> Self {
        Self {
            states: DashMap::new(),
            fault_rate,
            reject_rate,
        }
    }

    /// Registers equipment with a target speed (cycles/unit of time); a
    /// simulated snapshot is only produced for codes registered here.
    pub fn register(&self, equipment_code: EquipmentCode, target_speed: f64) {
        self.states.entry(equipment_code).or_insert_with(|| SimState::fresh(target_speed));
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceDriver for SimulatedDriver {
    async fn read_all_tags(&self, equipment_code: &EquipmentCode, now: DateTime<Utc>) -> Result<RawSnapshot, DriverError> {
        let mut entry = self
            .states
            .get_mut(equipment_code)
            .ok_or_else(|| DriverError::Unavailable(equipment_code.clone(), "unregistered simulated equipment".to_string()))?;

        let mut rng = rand::thread_rng();
        let mut fault_bits = FixedBitVec::zeroed(64);
        let mut active_alarms = std::collections::HashSet::new();

        if entry.ticks_until_fault_clears > 0 {
            entry.ticks_until_fault_clears -= 1;
            entry.running = false;
            if let Some(bit) = entry.active_fault_bit {
                fault_bits.set(bit, true);
                active_alarms.insert(format!("FAULT_BIT_{bit}"));
            }
        } else if entry.active_fault_bit.is_some() {
            entry.active_fault_bit = None;
            entry.running = true;
        }

        if entry.running && entry.active_fault_bit.is_none() && rng.gen_bool(self.fault_rate) {
            let bit = rng.gen_range(0..8);
            entry.active_fault_bit = Some(bit);
            entry.ticks_until_fault_clears = rng.gen_range(5..60);
            entry.running = false;
            fault_bits.set(bit, true);
            active_alarms.insert(format!("FAULT_BIT_{bit}"));
        }

        let speed = if entry.running {
            entry.target_speed * rng.gen_range(0.9..1.05)
        } else {
            0.0
        };

        if entry.running {
            let produced = (speed / 60.0).round().max(0.0) as u64;
            entry.product_count += produced;
            entry.total_parts += produced;
            let rejected = if rng.gen_bool(self.reject_rate) { produced.min(1) } else { 0 };
            entry.good_parts += produced - rejected;
        }

        let mut tag_values = HashMap::new();
        tag_values.insert("running".to_string(), if entry.running { 1.0 } else { 0.0 });
        tag_values.insert("speed".to_string(), speed);
        tag_values.insert("product_count".to_string(), entry.product_count as f64);
        tag_values.insert("good_parts".to_string(), entry.good_parts as f64);
        tag_values.insert("total_parts".to_string(), entry.total_parts as f64);
        tag_values.insert("cycle_time_seconds".to_string(), if speed > 0.1 { 60.0 / speed } else { 1.0 });

        Ok(RawSnapshot {
            equipment_code: equipment_code.clone(),
            timestamp: now,
            tag_values,
            fault_bits,
            active_alarms,
            communication_status: CommunicationStatus::Ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_equipment_is_unavailable() {
        let driver = SimulatedDriver::new();
        let result = driver.read_all_tags(&EquipmentCode::from("GHOST"), Utc::now()).await;
        assert!(matches!(result, Err(DriverError::Unavailable(_, _))));
    }

    #[tokio::test]
    async fn registered_equipment_reports_nonzero_speed_when_running() {
        let driver = SimulatedDriver::with_rates(0.0, 0.0);
        let code = EquipmentCode::from("LINE1-FILLER");
        driver.register(code.clone(), 120.0);
        let snapshot = driver.read_all_tags(&code, Utc::now()).await.unwrap();
        assert!(snapshot.tag_bool("running"));
        assert!(snapshot.tag("speed").unwrap() > 0.0);
    }

    #[tokio::test]
    async fn product_count_is_monotonic_across_reads() {
        let driver = SimulatedDriver::with_rates(0.0, 0.0);
        let code = EquipmentCode::from("LINE1-FILLER");
        driver.register(code.clone(), 120.0);
        let first = driver.read_all_tags(&code, Utc::now()).await.unwrap();
        let second = driver.read_all_tags(&code, Utc::now()).await.unwrap();
        assert!(second.tag("product_count").unwrap() >= first.tag("product_count").unwrap());
    }
}

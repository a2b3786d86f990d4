//! Downtime reason classification (spec §4.3).
//!
//! Runs once at event open and is never revised automatically. Grounded
//! on `downtime_tracker.py` (original_source) for the exact priority
//! order and subcategory heuristics.

use crate::faults::{FaultCatalog, FaultOrigin, FaultSeverity, FixedBitVec};
use crate::telemetry::{DerivedMetrics, EquipmentContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeCategory {
    Planned,
    Unplanned,
    Changeover,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeSubcategory {
    Preventive,
    Corrective,
    RawMaterial,
    Packaging,
}

#[derive(Debug, Clone)]
pub struct ClassifiedReason {
    pub reason_code: String,
    pub reason_description: String,
    pub category: DowntimeCategory,
    pub subcategory: Option<DowntimeSubcategory>,
}

/// Classifies why equipment went down, in spec §4.3 priority order:
/// 1. critical internal fault, 2. non-critical internal fault,
/// 3. upstream fault, 4. downstream fault, 5. planned stop,
/// 6. material shortage/jam, 7. unknown.
pub fn classify(
    fault_bits: &FixedBitVec,
    metrics: &DerivedMetrics,
    context: &EquipmentContext,
    catalog: &FaultCatalog,
) -> ClassifiedReason {
    let active = catalog.active_faults(fault_bits);

    if let Some(fault) = active
        .iter()
        .find(|f| f.origin == FaultOrigin::Internal && f.severity == FaultSeverity::Critical)
    {
        return ClassifiedReason {
            reason_code: fault.name.clone(),
            reason_description: fault.description.clone(),
            category: DowntimeCategory::Unplanned,
            subcategory: None,
        };
    }

    if let Some(fault) = active.iter().find(|f| f.origin == FaultOrigin::Internal) {
        return ClassifiedReason {
            reason_code: fault.name.clone(),
            reason_description: fault.description.clone(),
            category: DowntimeCategory::Unplanned,
            subcategory: None,
        };
    }

    if active.iter().any(|f| f.origin == FaultOrigin::Upstream) {
        return ClassifiedReason {
            reason_code: "UPSTREAM_STOP".to_string(),
            reason_description: "Upstream process fault".to_string(),
            category: DowntimeCategory::Unplanned,
            subcategory: None,
        };
    }

    if active.iter().any(|f| f.origin == FaultOrigin::Downstream) {
        return ClassifiedReason {
            reason_code: "DOWNSTREAM_STOP".to_string(),
            reason_description: "Downstream process fault".to_string(),
            category: DowntimeCategory::Unplanned,
            subcategory: None,
        };
    }

    if context.planned_stop {
        let subcategory = if context.planned_stop_is_preventive {
            DowntimeSubcategory::Preventive
        } else {
            DowntimeSubcategory::Corrective
        };
        return ClassifiedReason {
            reason_code: "MAINTENANCE".to_string(),
            reason_description: context
                .planned_stop_reason
                .clone()
                .unwrap_or_else(|| "Planned maintenance stop".to_string()),
            category: DowntimeCategory::Maintenance,
            subcategory: Some(subcategory),
        };
    }

    if metrics.material_shortage {
        let subcategory = if context.material_shortage_is_raw {
            DowntimeSubcategory::RawMaterial
        } else {
            DowntimeSubcategory::Packaging
        };
        return ClassifiedReason {
            reason_code: "MATERIAL_SHORTAGE".to_string(),
            reason_description: "Material shortage".to_string(),
            category: DowntimeCategory::Unplanned,
            subcategory: Some(subcategory),
        };
    }

    if metrics.material_jam {
        return ClassifiedReason {
            reason_code: "MATERIAL_JAM".to_string(),
            reason_description: "Material jam".to_string(),
            category: DowntimeCategory::Unplanned,
            subcategory: None,
        };
    }

    ClassifiedReason {
        reason_code: "UNKNOWN".to_string(),
        reason_description: "Unclassified downtime".to_string(),
        category: DowntimeCategory::Unplanned,
        subcategory: None,
    }
}

//! OEE Calculator (C6) — spec §4.4.
//!
//! Grounded on the teacher's `ml_engine/analyzer.rs` windowed numeric
//! rollups over a history buffer, and on `oee_calculator.py`
//! (original_source) for the real-time-tail quality-collapse rule and the
//! daily-rollup averaging choice. Pure arithmetic; the caller assembles
//! `OeeInputs` from the Downtime Tracker and Context Store so this module
//! stays free of I/O, matching the Metric Transformer's "pure function"
//! posture.

use super::reading::{round4, OeeReading};
use crate::config::defaults::OEE_EPSILON;
use crate::ids::{EquipmentCode, LineId, OeeReadingId};
use chrono::{DateTime, Utc};

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// A currently open, unplanned downtime event overlapping the window's
/// tail (spec §4.4 "Real-time variant").
#[derive(Debug, Clone, Copy)]
pub struct OpenDowntime {
    pub start_time: DateTime<Utc>,
}

/// Everything the calculator needs for one equipment/window; assembled by
/// the caller from the Downtime Tracker, Context Store and the window's
/// `OEEReading` history.
#[derive(Debug, Clone)]
pub struct OeeInputs {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Sum of unplanned-downtime duration intersecting the window, from
    /// already-closed events (spec §4.4 "actual_production_time := W -
    /// sum duration of unplanned downtime intersecting the window").
    pub closed_unplanned_downtime_seconds: i64,
    /// A currently open unplanned downtime event, if any (spec §4.4 "Real
    /// -time variant").
    pub open_unplanned_downtime: Option<OpenDowntime>,
    pub ideal_cycle_time: f64,
    /// Average `actual_cycle_time` over `OEEReading`s in the window, or
    /// `None` if there are none yet (falls back to 1 second, spec §4.4
    /// "(or 1 second if unset)").
    pub actual_cycle_time_avg: Option<f64>,
    pub good_parts: u64,
    pub total_parts: u64,
}

/// Computes one `OEEReading` for `[window_start, window_end]` on one
/// equipment (spec §4.4). `now` is the instant actual_production_time is
/// measured up to when an unplanned downtime event is still open.
pub fn calculate(
    line_id: LineId,
    equipment_code: EquipmentCode,
    now: DateTime<Utc>,
    inputs: OeeInputs,
) -> OeeReading {
    let planned_production_time = (inputs.window_end - inputs.window_start).num_seconds().max(0);
    let mut actual_production_time = planned_production_time - inputs.closed_unplanned_downtime_seconds;

    let mut good_parts = inputs.good_parts;
    let mut total_parts = inputs.total_parts;

    if let Some(open) = inputs.open_unplanned_downtime {
        let open_duration = (now - open.start_time).num_seconds().max(0);
        actual_production_time -= open_duration;
        // Quality collapses to 0 for the window's tail while the event
        // stays open (spec §4.4: "good_parts := 0 and total_parts := 1").
        good_parts = 0;
        total_parts = 1;
    }
    actual_production_time = actual_production_time.max(0);

    let availability = if planned_production_time > 0 {
        clamp01(actual_production_time as f64 / planned_production_time as f64)
    } else {
        0.0
    };

    let actual_cycle_time = inputs.actual_cycle_time_avg.filter(|t| *t > 0.0).unwrap_or(1.0);
    let performance = if actual_cycle_time > 0.0 {
        clamp01(inputs.ideal_cycle_time / actual_cycle_time)
    } else {
        0.0
    };

    let quality = good_parts as f64 / (total_parts.max(1)) as f64;

    let oee = availability * performance * quality;
    debug_assert!((oee - availability * performance * quality).abs() <= OEE_EPSILON);

    OeeReading {
        id: OeeReadingId::new(),
        line_id,
        equipment_code,
        calculation_time: now,
        window_seconds: planned_production_time,
        availability: round4(availability),
        performance: round4(performance),
        quality: round4(quality),
        oee: round4(oee),
        planned_production_time,
        actual_production_time,
        ideal_cycle_time: inputs.ideal_cycle_time,
        actual_cycle_time,
        good_parts,
        total_parts: total_parts.max(1),
    }
}

/// A weighting scheme for aggregating per-equipment OEE into a line-level
/// figure. The default (`None` / arithmetic mean) matches the source's
/// choice of simplicity over rigour (spec §4.4 "does not weight by
/// production time"); a caller may inject one, e.g. weighting by
/// `planned_production_time`.
pub trait RollupWeighting {
    fn weight(&self, reading: &OeeReading) -> f64;
}

/// Unweighted arithmetic mean (the spec's default).
pub struct ArithmeticMean;

impl RollupWeighting for ArithmeticMean {
    fn weight(&self, _reading: &OeeReading) -> f64 {
        1.0
    }
}

/// Rolls up a set of per-equipment readings (already restricted to the
/// rollup period) into a single line-level OEE figure.
pub fn rollup_line_oee(readings: &[OeeReading], weighting: &dyn RollupWeighting) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = readings.iter().map(|r| weighting.weight(r)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    readings.iter().map(|r| r.oee * weighting.weight(r)).sum::<f64>() / total_weight
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Trend label on an OEE time series (spec §4.4): `improving` if the last
/// reading exceeds the first by more than 5 percentage points,
/// `declining` if below by more than 5, else `stable`.
pub fn trend(series: &[f64]) -> Trend {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Trend::Stable;
    };
    let delta = last - first;
    if delta > 0.05 {
        Trend::Improving
    } else if delta < -0.05 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

//! Rolling per-equipment sample window feeding `OeeInputs` (spec §4.4).
//!
//! The calculator itself stays pure; this is the bookkeeping the Poller
//! needs to assemble its inputs tick over tick. Grounded on the teacher's
//! `ml_engine/analyzer.rs` rolling-window-over-a-history-buffer shape,
//! narrowed here to the handful of fields the OEE window actually needs.

use crate::ids::EquipmentCode;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    cycle_time: Option<f64>,
    good_parts_cumulative: u64,
    total_parts_cumulative: u64,
}

/// Per-equipment ring of recent tick samples, pruned to the configured
/// OEE window on every `record`.
#[derive(Debug, Default)]
pub struct OeeHistory {
    samples: DashMap<EquipmentCode, VecDeque<Sample>>,
}

impl OeeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tick's metrics and prunes samples older than `max_age`
    /// relative to `now`.
    pub fn record(
        &self,
        equipment_code: &EquipmentCode,
        now: DateTime<Utc>,
        cycle_time: Option<f64>,
        good_parts_cumulative: u64,
        total_parts_cumulative: u64,
        max_age: Duration,
    ) {
        let mut entry = self.samples.entry(equipment_code.clone()).or_default();
        entry.push_back(Sample { at: now, cycle_time, good_parts_cumulative, total_parts_cumulative });
        while entry.front().is_some_and(|s| now - s.at > max_age) {
            entry.pop_front();
        }
    }

    /// Average `cycle_time` over samples at or after `window_start`, and
    /// the good/total part counts produced since then (the delta between
    /// the cumulative counters at the window's first and last sample).
    /// Returns `(None, 0, 0)` if nothing has been recorded in the window
    /// yet.
    pub fn window_metrics(&self, equipment_code: &EquipmentCode, window_start: DateTime<Utc>) -> (Option<f64>, u64, u64) {
        let Some(entry) = self.samples.get(equipment_code) else {
            return (None, 0, 0);
        };
        let in_window: Vec<&Sample> = entry.iter().filter(|s| s.at >= window_start).collect();
        let Some(first) = in_window.first() else {
            return (None, 0, 0);
        };
        let last = in_window.last().unwrap();
        let cycle_times: Vec<f64> = in_window.iter().filter_map(|s| s.cycle_time).collect();
        let avg_cycle_time = if cycle_times.is_empty() {
            None
        } else {
            Some(cycle_times.iter().sum::<f64>() / cycle_times.len() as f64)
        };
        let good_delta = last.good_parts_cumulative.saturating_sub(first.good_parts_cumulative);
        let total_delta = last.total_parts_cumulative.saturating_sub(first.total_parts_cumulative);
        (avg_cycle_time, good_delta, total_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_metrics_computes_cumulative_delta() {
        let history = OeeHistory::new();
        let code = EquipmentCode::from("E1");
        let t0 = Utc::now();
        history.record(&code, t0, Some(1.0), 10, 12, Duration::hours(1));
        history.record(&code, t0 + Duration::seconds(30), Some(1.2), 50, 55, Duration::hours(1));
        let (avg, good, total) = history.window_metrics(&code, t0);
        assert_eq!(good, 40);
        assert_eq!(total, 43);
        assert!((avg.unwrap() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn empty_history_returns_none() {
        let history = OeeHistory::new();
        let code = EquipmentCode::from("E1");
        let (avg, good, total) = history.window_metrics(&code, Utc::now());
        assert!(avg.is_none());
        assert_eq!((good, total), (0, 0));
    }

    #[test]
    fn old_samples_are_pruned() {
        let history = OeeHistory::new();
        let code = EquipmentCode::from("E1");
        let t0 = Utc::now();
        history.record(&code, t0, Some(1.0), 0, 0, Duration::seconds(10));
        history.record(&code, t0 + Duration::seconds(20), Some(2.0), 5, 5, Duration::seconds(10));
        let (avg, _, _) = history.window_metrics(&code, t0);
        assert_eq!(avg, Some(2.0));
    }
}

//! OEE Calculator (C6): windowed availability/performance/quality, the
//! real-time open-downtime variant, rollups and trend labels (spec §4.4).

mod calculator;
mod history;
mod reading;

pub use calculator::{calculate, rollup_line_oee, trend, ArithmeticMean, OeeInputs, OpenDowntime, RollupWeighting, Trend};
pub use history::OeeHistory;
pub use reading::{round4, OeeReading};

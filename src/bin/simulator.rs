//! plc-simulator — exercises `pipeline::driver::SimulatedDriver` standalone,
//! printing one JSON `RawSnapshot` per tick per piece of equipment. Useful
//! for watching the simulated PLC data a `floorline-server` run would be
//! fed, without bringing up the rest of the engine.
//!
//! Grounded on the teacher's `bin/simulation.rs` clap-args-plus-a-tick-loop
//! shape, narrowed here to one driver instead of a full WITS packet
//! generator.

use clap::Parser;
use floorline_engine::ids::EquipmentCode;
use floorline_engine::pipeline::{DeviceDriver, SimulatedDriver};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "plc-simulator")]
#[command(about = "Standalone PLC tag simulator for local development")]
#[command(version)]
struct Args {
    /// Equipment codes to simulate, comma-separated.
    #[arg(long, default_value = "L1-FILLER,L1-CAPPER,L1-LABELER")]
    equipment: String,

    /// Target speed (parts/minute) for every simulated equipment.
    #[arg(long, default_value = "120.0")]
    target_speed: f64,

    /// Per-tick probability of a new fault starting.
    #[arg(long, default_value = "0.02")]
    fault_rate: f64,

    /// Per-tick probability of a produced part being rejected.
    #[arg(long, default_value = "0.03")]
    reject_rate: f64,

    /// Ticks per second.
    #[arg(long, default_value = "1")]
    rate_hz: u64,

    /// Number of ticks to run; omit to run forever.
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let driver = SimulatedDriver::with_rates(args.fault_rate, args.reject_rate);
    let codes: Vec<EquipmentCode> = args.equipment.split(',').map(str::trim).map(EquipmentCode::from).collect();
    for code in &codes {
        driver.register(code.clone(), args.target_speed);
    }

    let interval = Duration::from_millis(1000 / args.rate_hz.max(1));
    let mut ticker = tokio::time::interval(interval);
    let mut tick_count = 0u64;

    loop {
        if let Some(limit) = args.ticks {
            if tick_count >= limit {
                break;
            }
        }
        ticker.tick().await;
        let now = chrono::Utc::now();
        for code in &codes {
            match driver.read_all_tags(code, now).await {
                Ok(snapshot) => {
                    if let Ok(json) = serde_json::to_string(&snapshot) {
                        println!("{json}");
                    }
                }
                Err(e) => tracing::warn!(equipment = %code, error = %e, "simulated read failed"),
            }
        }
        tick_count += 1;
    }
}

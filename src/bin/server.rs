//! floorline-server — boots the telemetry engine: loads configuration and
//! the fault catalog, wires the C1-C11 components together, spawns one
//! Poller per enabled production line, and serves the health/stats/
//! websocket HTTP surface until Ctrl+C.
//!
//! Grounded on the teacher's `main.rs` bootstrap shape: tracing init,
//! clap args, a `CancellationToken` cancelled from a signal handler, and
//! a single `tokio::main` driving everything else.

use anyhow::{Context, Result};
use clap::Parser;
use floorline_engine::andon::{AndonEngine, NullDirectory};
use floorline_engine::api::{create_app, EngineState};
use floorline_engine::config::{self, EngineConfig};
use floorline_engine::downtime::DowntimeTracker;
use floorline_engine::events::EventBus;
use floorline_engine::faults::FaultCatalog;
use floorline_engine::hub::{PermissiveVerifier, SubscriptionHub};
use floorline_engine::jobs::{JobMapper, NullCatalog};
use floorline_engine::line::LineRegistry;
use floorline_engine::pipeline::{Poller, SimulatedDriver};
use floorline_engine::telemetry::ContextStore;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "floorline-server")]
#[command(about = "Manufacturing floor telemetry, OEE and Andon engine")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML file listing production lines and their equipment.
    /// Falls back to a single demo line when unset.
    #[arg(long)]
    lines: Option<String>,

    /// Override the listen address from `EngineConfig`.
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut engine_config = EngineConfig::from_env();
    if let Some(addr) = args.addr {
        engine_config.listen_addr = addr;
    }
    if let Err(errors) = config::validate(&engine_config) {
        for error in &errors {
            tracing::error!(%error, "invalid engine configuration");
        }
        anyhow::bail!("refusing to start with {} configuration error(s)", errors.len());
    }
    config::init(engine_config.clone());

    let catalog = Arc::new(
        FaultCatalog::load(&engine_config.fault_catalog_path).unwrap_or_else(|e| {
            warn!(error = %e, "could not load fault catalog file, falling back to the built-in default");
            FaultCatalog::default_catalog()
        }),
    );

    let lines = Arc::new(match &args.lines {
        Some(path) => LineRegistry::load(path).context("failed to load line config")?,
        None => demo_lines(),
    });

    let context_store = Arc::new(ContextStore::new());
    let now = chrono::Utc::now();
    for line in lines.all() {
        for equipment_code in &line.equipment_codes {
            context_store.register(equipment_code.clone(), line.id, now);
        }
    }

    let downtime = Arc::new(DowntimeTracker::new());
    let jobs = Arc::new(JobMapper::new(context_store.clone(), Arc::new(NullCatalog)));
    let andon = Arc::new(AndonEngine::new(Arc::new(NullDirectory)));
    let bus = Arc::new(EventBus::new(engine_config.bus_queue_capacity));
    let hub = Arc::new(SubscriptionHub::new());

    let driver = Arc::new(SimulatedDriver::new());
    for line in lines.all() {
        for equipment_code in &line.equipment_codes {
            driver.register(equipment_code.clone(), line.target_speed);
        }
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received Ctrl+C, shutting down");
        shutdown.cancel();
    });

    let tick_interval = std::time::Duration::from_millis(engine_config.poll_interval_ms);
    let oee_window = chrono::Duration::minutes(engine_config.oee_window_minutes);
    let mut pollers = JoinSet::new();
    for line in lines.enabled_lines().cloned() {
        let poller = Arc::new(Poller::new(
            line,
            driver.clone(),
            catalog.clone(),
            context_store.clone(),
            downtime.clone(),
            jobs.clone(),
            andon.clone(),
            bus.clone(),
            engine_config.andon_thresholds.clone(),
            oee_window,
            engine_config.driver_failure_threshold,
        ));
        let cancel = cancel.clone();
        pollers.spawn(async move { poller.run(tick_interval, cancel).await });
    }

    let state = EngineState {
        lines: lines.clone(),
        bus: bus.clone(),
        andon: andon.clone(),
        downtime: downtime.clone(),
    };
    let app = create_app(state, hub, Arc::new(PermissiveVerifier), engine_config.send_queue_capacity);

    let listener = tokio::net::TcpListener::bind(&engine_config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", engine_config.listen_addr))?;
    info!(addr = %engine_config.listen_addr, lines = lines.all().len(), "floorline-server listening");

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await
        .context("http server failed")?;

    cancel.cancel();
    while pollers.join_next().await.is_some() {}
    info!("floorline-server shutdown complete");
    Ok(())
}

fn demo_lines() -> LineRegistry {
    use floorline_engine::ids::EquipmentCode;
    let line = floorline_engine::ProductionLine::new("L1", "Packaging Line 1", 120.0).with_equipment([
        EquipmentCode::from("L1-FILLER"),
        EquipmentCode::from("L1-CAPPER"),
        EquipmentCode::from("L1-LABELER"),
    ]);
    LineRegistry::new(vec![line])
}

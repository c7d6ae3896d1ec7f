//! Polis - World Server
//!
//! # Usage
//!
//! ```bash
//! # Run with the shipped config
//! cargo run -p polis_server -- --config data/server.ron
//!
//! # Override the data files and log at debug level
//! cargo run -p polis_server -- --data my_rules.ron --world my_world.ron --verbose
//! ```
//!
//! `RUST_LOG` takes precedence over `--verbose` when set.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use polis_core::clock::{Clock, SystemClock};
use polis_core::movement::MovementScheduler;
use polis_core::queue::QueueEngine;
use polis_core::store::StateStore;
use polis_server::observer::CityObserver;
use polis_server::scheduler::Scheduler;
use polis_server::world::WorldSeed;
use polis_server::{load_game_data, ConfigError, ServerConfig};

#[derive(Parser)]
#[command(name = "polis_server")]
#[command(about = "Headless world server for Polis")]
#[command(version)]
struct Cli {
    /// Server config file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Game data file, overriding the config
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// World seed file, overriding the config
    #[arg(short, long)]
    world: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match serve(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Server failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli: Cli) -> Result<(), ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    if let Some(world) = cli.world {
        config.world_path = Some(world);
    }

    tracing::info!("Starting Polis world server");

    let data = Arc::new(load_game_data(&config.data_path)?);
    tracing::info!(
        units = data.units.len(),
        buildings = data.buildings.len(),
        research = data.research.len(),
        "Game data loaded"
    );

    let store = StateStore::new(
        Arc::new(polis_core::store::MemoryStore::new()),
        config.retry,
    );
    if let Some(path) = &config.world_path {
        WorldSeed::load(path)?.apply(&store, &data)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queues = QueueEngine::new(Arc::clone(&data), store.clone());
    let movements = MovementScheduler::new(Arc::clone(&data), store.clone());
    let scheduler = Scheduler::new(queues, movements, Arc::clone(&clock), &config);

    let observer = Arc::new(CityObserver::new(
        store.clone(),
        Arc::clone(&clock),
        config.cache_ttl_ms,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let observer_task = tokio::spawn(
        Arc::clone(&observer).follow(scheduler.subscribe(), shutdown_rx.clone()),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Cannot listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    for (name, task) in [("scheduler", scheduler_task), ("observer", observer_task)] {
        if let Err(err) = task.await {
            tracing::error!(task = name, error = %err, "Task ended abnormally");
        }
    }
    Ok(())
}

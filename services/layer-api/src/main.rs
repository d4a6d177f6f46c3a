//! Geodata layer ingestion API service.
//!
//! Bridges the upload portal to the rendering stack: pulls uploaded layer
//! files (shapefile bundles, KML documents, aerial imagery) out of object
//! storage, stages them locally, publishes them to the rendering service
//! and records them in the layer catalog.

mod access;
mod config;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ingestion::{LayerPipeline, PublishClient, StagingArea};
use storage::{Catalog, ObjectStorage};

use config::AppConfig;
use server::{RunTracker, ServerState};

#[derive(Parser, Debug)]
#[command(name = "layer-api")]
#[command(about = "Geodata layer ingestion API")]
struct Args {
    /// Port for the HTTP API
    #[arg(long, env = "API_PORT", default_value = "8084")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting geodata layer API");

    // Load configuration
    let config = AppConfig::from_env()?;
    info!(
        bucket = %config.storage.bucket,
        data_root = %config.data_root.display(),
        "Loaded configuration"
    );

    // Setup clients
    let store = ObjectStorage::connect(&config.storage).await;
    let catalog = Catalog::connect(&config.database_url).await?;
    catalog.migrate().await?;
    let publisher = PublishClient::new(config.publish.clone())?;
    let staging = StagingArea::new(config.data_root.clone());

    // A crashed run can leave partial downloads behind
    staging.wipe().await?;

    let pipeline = LayerPipeline::new(store, catalog, publisher, staging);

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = Arc::new(ServerState {
        pipeline,
        shutdown: shutdown_tx.clone(),
        run_gate: Mutex::new(()),
        tracker: RunTracker::new(),
    });

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    server::run_server(state, args.port, shutdown_tx.subscribe()).await?;

    Ok(())
}

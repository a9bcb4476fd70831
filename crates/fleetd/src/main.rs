//! # fleetd
//!
//! Fleet coordination server binary — wires the store, coordination core,
//! and WebSocket transport together and serves until interrupted.

#![deny(unsafe_code)]

mod providers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fleet_coordination::{FleetCoordinator, GroupStore, OwnershipStore, TransportGateway};
use fleet_core::UserId;
use fleet_server::{FleetServer, WsTransport};
use fleet_store::SqliteStore;

use crate::providers::{LogNotifier, OwnershipAuthorizer};

/// Fleet coordination server.
#[derive(Parser, Debug)]
#[command(name = "fleetd", about = "Robot fleet coordination server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SQLite database (overrides settings if specified).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Users granted fleet-wide (admin) privileges.
    #[arg(long = "admin", value_name = "USER_ID")]
    admins: Vec<String>,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = fleet_settings::load_settings().context("Failed to load settings")?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        settings.store.db_path = db_path.display().to_string();
    }

    fleet_logging::init(&settings.logging.level, settings.logging.json)
        .context("Failed to initialize logging")?;
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        db_path = %settings.store.db_path,
        "starting fleetd"
    );

    let db_path = PathBuf::from(&settings.store.db_path);
    ensure_parent_dir(&db_path)?;
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open store at {}", db_path.display()))?,
    );

    let transport = Arc::new(WsTransport::new());
    let admins: Vec<UserId> = cli.admins.into_iter().map(UserId::from_string).collect();
    let authorizer = Arc::new(OwnershipAuthorizer::new(
        Arc::clone(&store) as Arc<dyn OwnershipStore>,
        admins,
    ));

    let coordinator = Arc::new(FleetCoordinator::new(
        settings.coordination.clone(),
        Arc::clone(&transport) as Arc<dyn TransportGateway>,
        Arc::new(LogNotifier),
        authorizer,
        Arc::clone(&store) as Arc<dyn GroupStore>,
        Arc::clone(&store) as Arc<dyn OwnershipStore>,
    ));
    coordinator.start_background_tasks();

    let server = FleetServer::new(
        settings.server.clone(),
        Arc::clone(&coordinator),
        transport,
    );

    let shutdown = server.shutdown_token();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    server.run().await.context("Server failed")?;
    coordinator.shutdown().await;
    info!("fleetd stopped");
    Ok(())
}

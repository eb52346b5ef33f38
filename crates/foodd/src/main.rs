//! foodd — the FoodGrid daemon.
//!
//! Single binary that assembles the FoodGrid subsystems:
//! - State store (redb)
//! - Requirement cache + allocation scheduler
//! - Restart recovery
//! - REST API
//!
//! # Usage
//!
//! ```text
//! foodd serve --port 8443 --data-dir /var/lib/foodgrid --offer-window 10m
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use config::{FoodgridConfig, Overrides, Settings};
use foodgrid_scheduler::{RequirementCache, Scheduler};
use foodgrid_state::StateStore;

#[derive(Parser)]
#[command(name = "foodd", about = "FoodGrid donation allocation daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover pending donations and serve the API.
    Serve {
        /// Path to a foodgrid.toml file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (default 8443).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (default /var/lib/foodgrid).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Time an agency has to answer an offer, e.g. "600s" or "10m".
        #[arg(long)]
        offer_window: Option<String>,

        /// How often offer deadlines are checked, e.g. "5s".
        #[arg(long)]
        poll_interval: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,foodd=debug,foodgrid=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            offer_window,
            poll_interval,
        } => {
            let file = match config {
                Some(path) => FoodgridConfig::from_file(&path)?,
                None => FoodgridConfig::default(),
            };
            let settings = file.resolve(Overrides {
                port,
                data_dir,
                offer_window,
                poll_interval,
            })?;
            run_serve(settings).await
        }
    }
}

async fn run_serve(settings: Settings) -> anyhow::Result<()> {
    info!(
        offer_window = ?settings.scheduler.offer_window(),
        poll_interval = ?settings.scheduler.poll_interval(),
        "FoodGrid daemon starting"
    );

    // Ensure data directory exists.
    std::fs::create_dir_all(&settings.data_dir)?;
    let db_path = settings.data_dir.join("foodgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Scheduler.
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(store.clone()),
        RequirementCache::new(),
        settings.scheduler,
    ));
    info!("scheduler initialized");

    // Recovery must finish before any request is served.
    let report = scheduler.recover().await?;
    info!(
        requirements = report.requirements_loaded,
        donations = report.donations_found,
        offered = report.offered,
        failed = report.failed,
        "pending donations recovered"
    );

    // ── Start API server ───────────────────────────────────────

    let router = foodgrid_api::build_router(store, scheduler.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    // Stop offer timers.
    scheduler.shutdown().await;

    info!("FoodGrid daemon stopped");
    Ok(())
}

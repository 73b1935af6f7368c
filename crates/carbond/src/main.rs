//! carbond: the carbon-aware placement daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Carbon intensity fetcher (Electricity Maps or WattTime)
//! - Reconciler + periodic controller
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! carbond run --config /etc/carbonaware/carbond.toml
//! carbond apply --file policies.json --data-dir /var/lib/carbonaware
//! carbond status default/green --data-dir /var/lib/carbonaware
//! ```

mod config;
mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use carbon_api::{ApiState, build_router};
use carbon_controller::{Controller, Reconciler};
use carbon_intensity::GridIntensityFetcher;
use carbon_metrics::OperatorMetrics;
use carbon_state::StateStore;

use crate::config::{DaemonConfig, LogFormat};
use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "carbond", about = "Carbon-aware placement daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller and the API server.
    Run {
        /// Path to carbond.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load policies and placement targets from a JSON manifest.
    Apply {
        /// Manifest with `policies` and `targets` arrays.
        #[arg(long)]
        file: PathBuf,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/carbonaware")]
        data_dir: PathBuf,
    },

    /// Print a policy's status as JSON.
    Status {
        /// Policy key as `namespace/name`.
        policy: String,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/carbonaware")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = match config {
                Some(path) => DaemonConfig::from_file(&path)?,
                None => DaemonConfig::default(),
            };
            init_tracing(config.log_format);
            run(config).await
        }
        Command::Apply { file, data_dir } => {
            init_tracing(LogFormat::Text);
            apply(&file, &data_dir)
        }
        Command::Status { policy, data_dir } => {
            init_tracing(LogFormat::Text);
            status(&policy, &data_dir)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,carbond=debug,carbon_controller=debug,carbon_intensity=debug",
        )
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = config::db_path(data_dir);
    let store = StateStore::open(&db_path)
        .with_context(|| format!("failed to open state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(provider = %config.provider, "carbond starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config.data_dir)?;

    let fetcher = GridIntensityFetcher::from_env(&config.provider, config.provider_timeout()?)?;

    let metrics = Arc::new(OperatorMetrics::new());

    let reconciler = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(fetcher),
        metrics.clone(),
    )
    .with_requeue_interval(config.requeue_interval()?)
    .with_cycle_timeout(config.cycle_timeout()?);

    let (controller, handle) = Controller::new(Arc::new(reconciler));

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_task = tokio::spawn(controller.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let api_state = ApiState::new(store, metrics).with_trigger(Arc::new(move |key: &str| {
        if !handle.trigger(key) {
            warn!(policy = %key, "controller stopped, trigger dropped");
        }
    }));
    let router = build_router(api_state);

    info!(addr = %config.listen, "API server starting");
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = controller_task.await {
        warn!(error = %e, "controller task failed");
    }

    info!("carbond stopped");
    Ok(())
}

fn apply(file: &Path, data_dir: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::from_file(file)?;
    let store = open_store(data_dir)?;
    let (policies, targets) = manifest.apply(&store)?;
    println!("applied {policies} policies and {targets} targets");
    Ok(())
}

fn status(policy: &str, data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let found = store
        .get_policy(policy)?
        .with_context(|| format!("policy {policy} not found"))?;
    println!("{}", serde_json::to_string_pretty(&found.status)?);
    Ok(())
}

// crates/server/src/main.rs
//! Corpus admin server binary.
//!
//! Loads the configuration, restores the job registry left by the previous
//! run, resubmits jobs that never finished, then serves the API until
//! Ctrl-C or SIGTERM. The registry is written back on the way out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corpadm_core::{AppConfig, ProcessExtractor};
use corpadm_db::Database;
use corpadm_server::jobs::{resubmit_orphaned_jobs, JobRegistry};
use corpadm_server::liveattrs::UsageRecorder;
use corpadm_server::{create_app, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "corpadm", about = "Corpus administration service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP service.
    Start {
        /// Path to the TOML configuration file.
        config: PathBuf,
    },
    /// Print the version and exit.
    Version,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

async fn run(config: AppConfig) -> Result<()> {
    let db = Database::new(&config.liveattrs.db_path)
        .await
        .with_context(|| format!("cannot open {}", config.liveattrs.db_path.display()))?;

    let status_path = config.jobs.status_data_path.clone();
    let registry = Arc::new(JobRegistry::restore(&status_path).await);
    tracing::info!(jobs = registry.len(), path = %status_path.display(), "job registry restored");

    let (usage, usage_writer) =
        UsageRecorder::spawn(db.clone(), config.liveattrs.usage_channel_capacity);
    let extractor = Arc::new(ProcessExtractor::new(
        config.extractor.command.clone(),
        config.extractor.args.clone(),
    ));
    let cleanup_every = Duration::from_secs(config.jobs.cleanup_interval_secs.max(1));
    let addr = config.bind_addr();

    let state = AppState::new(config, db, Arc::clone(&registry), extractor, usage);
    resubmit_orphaned_jobs(&registry, &state.extraction, &state.maintenance).await;

    let cleanup_registry = Arc::clone(&registry);
    let cleanup = tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = cleanup_registry.cleanup();
            if removed > 0 {
                tracing::info!(removed, "expired jobs removed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "listening");

    axum::serve(listener, create_app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    state.extraction.shutdown();
    state.usage.close();
    if let Err(e) = usage_writer.await {
        tracing::warn!("usage writer ended abnormally: {e}");
    }
    if let Err(e) = registry.persist(&status_path).await {
        tracing::error!(path = %status_path.display(), "cannot save job registry: {e}");
    }
    tracing::info!("shut down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Version => {
            println!("corpadm {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Start { config } => {
            let config = AppConfig::load(&config)
                .with_context(|| format!("cannot load {}", config.display()))?;
            init_logging(&config.log_level);
            run(config).await
        }
    }
}

use anyhow::Context;
use autoani_core::{
    AppConfig, ConfigLoader, DatabaseConfig, ExperimentEngine, InMemoryTestStore, StorageBackend,
    TestStore,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;

mod commands;

use commands::{AnalyzeArgs, AssignArgs, SampleSizeArgs};

#[derive(Parser)]
#[command(name = "autoani")]
#[command(about = "A/B testing engine for the AUTO ANI dealership site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web API and the auto-conclusion sweep
    Server {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Run one auto-conclusion sweep and exit
    Sweep {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Analyze exported arm counts offline
    Analyze(AnalyzeArgs),
    /// Estimate the traffic a test needs
    SampleSize(SampleSizeArgs),
    /// Show which arm a visitor is assigned to
    Assign(AssignArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Server { config } => {
            run_server(&config).await?;
        }
        Commands::Sweep { config } => {
            run_sweep(&config).await?;
        }
        Commands::Analyze(args) => {
            commands::run_analyze(&args)?;
        }
        Commands::SampleSize(args) => {
            commands::run_sample_size(&args)?;
        }
        Commands::Assign(args) => {
            commands::run_assign(&args)?;
        }
    }

    Ok(())
}

fn load_config(config_path: &str) -> anyhow::Result<AppConfig> {
    ConfigLoader::load_from(config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))
}

async fn build_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn TestStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory test store; tests are lost on exit");
            Ok(Arc::new(InMemoryTestStore::new()))
        }
        StorageBackend::Postgres => {
            tracing::info!("Connecting to PostgreSQL test store");
            let client = autoani_data::DatabaseClient::new(&config.url, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            Ok(Arc::new(client.test_store()))
        }
    }
}

async fn run_server(config_path: &str) -> anyhow::Result<()> {
    tracing::info!("Starting A/B testing service with config: {}", config_path);

    let config = load_config(config_path)?;
    let store = build_store(&config.database).await?;
    let engine = Arc::new(ExperimentEngine::new(store, config.experiments.clone()));

    let sweep = autoani_sweep_scheduler::SweepScheduler::new(
        config.sweep.clone(),
        engine.lifecycle().clone(),
    );
    let mut scheduler = sweep.start().await?;

    let server = autoani_web_api::ApiServer::new(engine);
    server
        .serve_with_shutdown(&config.server.addr(), shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::error!("Error stopping sweep scheduler: {}", e);
        }
    }

    tracing::info!("A/B testing service stopped");
    Ok(())
}

async fn run_sweep(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = build_store(&config.database).await?;
    let engine = ExperimentEngine::new(store, config.experiments.clone());

    let sweep = autoani_sweep_scheduler::SweepScheduler::new(
        config.sweep.clone(),
        engine.lifecycle().clone(),
    );
    let concluded = sweep.run_once().await?;

    if concluded.is_empty() {
        println!("No tests concluded.");
    }
    for test in concluded {
        println!(
            "{}  winner={}  {}",
            test.id,
            test.winner.as_deref().unwrap_or("none"),
            test.conclusion.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            tracing::error!("Failed to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

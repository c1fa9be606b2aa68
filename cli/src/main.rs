// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! `easel`: the generation-job orchestrator daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use easel_orchestrator_core::application::admission::AdmissionService;
use easel_orchestrator_core::application::pipeline::{JobDispatcher, JobPipeline};
use easel_orchestrator_core::application::polling::PollSettings;
use easel_orchestrator_core::application::session::DraftSessionStore;
use easel_orchestrator_core::application::status::StatusService;
use easel_orchestrator_core::domain::notification::Notifier;
use easel_orchestrator_core::domain::repository::{JobRepository, LedgerRepository};
use easel_orchestrator_core::domain::service_config::{resolve_secret, ServiceConfig};
use easel_orchestrator_core::infrastructure::repositories::{
    InMemoryJobRepository, InMemoryLedgerRepository, PostgresJobRepository,
    PostgresLedgerRepository,
};
use easel_orchestrator_core::infrastructure::{
    Database, HttpNotifier, InlineDispatcher, NoopNotifier, ProviderRegistry, QueueDispatcher,
    QueueWorker,
};
use easel_orchestrator_core::presentation;

#[derive(Parser)]
#[command(name = "easel", version, about = "Easel generation-job orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator daemon.
    Serve {
        /// Path to the service manifest.
        #[arg(long, default_value = "easel-config.yaml")]
        config: PathBuf,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print a starter manifest to stdout.
    Generate,
    /// Parse a manifest and report errors.
    Validate {
        #[arg(long, default_value = "easel-config.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Config { command: ConfigCommand::Generate } => {
            print!("{}", ServiceConfig::starter().to_yaml()?);
            Ok(())
        }
        Command::Config { command: ConfigCommand::Validate { config } } => {
            ServiceConfig::from_file(&config)
                .with_context(|| format!("invalid manifest at {}", config.display()))?;
            println!("{}: ok", config.display());
            Ok(())
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = ServiceConfig::from_file(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let registry = Arc::new(ProviderRegistry::from_config(&config));

    let notifier: Arc<dyn Notifier> = match &config.notifications {
        Some(n) => Arc::new(HttpNotifier::new(n.endpoint.clone())),
        None => Arc::new(NoopNotifier),
    };

    // Try the durable backend; degrade to in-memory + inline dispatch
    // when it is unavailable.
    let database = match resolve_secret(&config.database.url) {
        Ok(url) if !url.is_empty() => match Database::new(&url).await {
            Ok(db) => {
                db.init_schema().await.context("schema init failed")?;
                Some(db)
            }
            Err(e) => {
                warn!(error = %e, "database unreachable, falling back to in-memory mode");
                None
            }
        },
        _ => {
            warn!("no database configured, running in-memory");
            None
        }
    };

    let (jobs, ledger): (Arc<dyn JobRepository>, Arc<dyn LedgerRepository>) = match &database {
        Some(db) => (
            Arc::new(PostgresJobRepository::new(db.get_pool().clone())),
            Arc::new(PostgresLedgerRepository::new(db.get_pool().clone())),
        ),
        None => (
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(InMemoryLedgerRepository::new()),
        ),
    };

    let pipeline = Arc::new(JobPipeline::new(
        config.route_table(),
        registry,
        jobs.clone(),
        ledger.clone(),
        notifier,
        PollSettings::default(),
    ));

    let dispatcher: Arc<dyn JobDispatcher> = match &database {
        Some(db) => {
            let worker = Arc::new(QueueWorker::new(
                db.get_pool().clone(),
                pipeline.clone(),
                jobs.clone(),
                config.queue.clone(),
            ));
            worker.recover().await.context("queue recovery failed")?;
            worker.spawn();
            Arc::new(QueueDispatcher::new(db.get_pool().clone()))
        }
        None => Arc::new(InlineDispatcher::new(pipeline.clone())),
    };

    let admission = Arc::new(AdmissionService::new(
        config.price_table(),
        jobs.clone(),
        ledger,
        dispatcher,
    ));
    let status = Arc::new(StatusService::new(jobs, pipeline));

    let drafts = Arc::new(DraftSessionStore::new());
    tokio::spawn({
        let drafts = drafts.clone();
        async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                tick.tick().await;
                drafts.prune(chrono::Duration::hours(24));
            }
        }
    });

    let app = presentation::app(admission, status, drafts);
    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;
    info!(bind = %config.http.bind, "orchestrator listening");
    axum::serve(listener, app).await?;
    Ok(())
}

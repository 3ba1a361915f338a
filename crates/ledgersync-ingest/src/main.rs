//! Ledgersync Ingest - batch ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledgersync_common::logging::{init_logging, LogConfig, LogLevel};
use ledgersync_common::{SyncAction, Table, TenantScope};
use ledgersync_ingest::{files, passes, report::write_report};
use ledgersync_server::config::DatabaseConfig;
use ledgersync_server::db::{self, MemoryStore, PgStore, Store};
use ledgersync_server::ingest::config::DEFAULT_CONCURRENCY;
use ledgersync_server::ingest::{
    FullSyncOrchestrator, HttpSourceClient, IngestPipeline, OutcomeAction, SyncConfig, SyncOutcome, SyncRequest,
};
use ledgersync_server::models::JobStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledgersync-ingest")]
#[command(author, version, about = "Ledgersync batch ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Company of the tenant scope
    #[arg(long, env = "LEDGERSYNC_COMPANY_ID")]
    company: Uuid,

    /// Division of the tenant scope
    #[arg(long, env = "LEDGERSYNC_DIVISION_ID")]
    division: Uuid,

    /// Run against an in-memory store instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest exported payload files, in order
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Run the linker and reconciler after each file
        #[arg(long)]
        live: bool,
    },

    /// Pull tables from the exporter and record the run as a job
    Sync {
        /// Tables to sync (comma separated); all syncable tables when omitted
        #[arg(long = "tables", value_delimiter = ',')]
        tables: Vec<Table>,

        /// full-sync, health-check or metadata
        #[arg(long, default_value = "full-sync")]
        action: SyncAction,

        /// Exporter endpoint, overriding SYNC_SOURCE_URL
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Link unlinked entries to their vouchers
    Link {
        #[arg(long, default_value_t = 10)]
        max_passes: usize,
    },

    /// Fill missing voucher amounts from their ledger entries
    Reconcile {
        #[arg(long, default_value_t = 10)]
        max_passes: usize,
    },

    /// Audit referential integrity of the tenant scope
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ledgersync-ingest")
        .build()
        .merge_env()
        .context("Invalid logging configuration")?;
    let _guard = init_logging(&log_config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling");
            on_signal.cancel();
        }
    });

    if cli.dry_run {
        info!("Dry run: using the in-memory store");
        let config = SyncConfig::from_env(DEFAULT_CONCURRENCY);
        return run(&cli, Arc::new(MemoryStore::new()), config, cancel).await;
    }

    let database = DatabaseConfig::from_env();
    database.validate()?;
    let pool = db::create_pool(&database)
        .await
        .context("Failed to connect to the database")?;
    let store = PgStore::new(pool);
    store.migrate().await.context("Failed to run migrations")?;

    let config = SyncConfig::from_env(database.max_connections as usize);
    run(&cli, Arc::new(store), config, cancel).await
}

async fn run<S: Store>(cli: &Cli, store: Arc<S>, config: SyncConfig, cancel: CancellationToken) -> Result<()> {
    config.validate()?;
    let scope = TenantScope::new(cli.company, cli.division);
    let pipeline = IngestPipeline::new(store, config.clone()).with_cancellation(cancel.child_token());
    let report_path = cli.report.as_deref();

    match &cli.command {
        Command::Ingest { files, live } => {
            let reports = files::ingest_files(&pipeline, files, scope, *live).await?;
            write_report(&reports, report_path)?;

            let errors: usize = reports.iter().map(|r| r.report.count(OutcomeAction::Error)).sum();
            if errors > 0 {
                warn!(errors, "Some records failed to ingest");
            }
        }
        Command::Sync {
            tables,
            action,
            source_url,
        } => {
            let url = source_url.clone().unwrap_or_else(|| config.source_url.clone());
            let source = HttpSourceClient::new(url, config.source_timeout()).context("Failed to build source client")?;
            let orchestrator =
                FullSyncOrchestrator::new(pipeline, Arc::new(source)).with_cancellation(cancel.child_token());

            let request = SyncRequest::full_sync(scope)
                .with_tables(tables.iter().copied())
                .with_action(*action);
            let outcome = orchestrator.run(request).await?;
            write_report(&outcome, report_path)?;

            if let SyncOutcome::FullSync(report) = &outcome {
                if report.job.status == JobStatus::Failed {
                    anyhow::bail!(
                        "Sync job {} failed: {}",
                        report.job.id,
                        report.job.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        Command::Link { max_passes } => {
            let reports = passes::link(pipeline.store(), &config, &scope, *max_passes, &cancel).await?;
            write_report(&reports, report_path)?;
        }
        Command::Reconcile { max_passes } => {
            let reports = passes::reconcile(pipeline.store(), &config, &scope, *max_passes, &cancel).await?;
            write_report(&reports, report_path)?;
        }
        Command::Validate => {
            let report = passes::validate(pipeline.store(), &scope, &cancel).await;
            info!(health_score = report.health_score, issues = report.total_issues, "Validation finished");
            write_report(&report, report_path)?;
        }
    }

    Ok(())
}

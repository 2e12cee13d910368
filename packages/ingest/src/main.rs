#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the company registry ingestion tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{Args, Parser, Subcommand};
use company_registry_cli_utils::RowProgress;
use company_registry_database::dry_run::DryRunStore;
use company_registry_database::store::{PostgresStore, TargetStore};
use company_registry_database::{db, run_migrations};
use company_registry_ingest::config::{self, ConfigOverrides};
use company_registry_ingest::{
    IngestError, cancel_on_interrupt, report, run_ingestion, run_ingestion_from_reader,
};
use company_registry_ingest_models::progress::ProgressCallback;
use company_registry_ingest_models::{ConflictPolicy, IngestConfig, IngestSummary, LoadMode};

#[derive(Parser)]
#[command(
    name = "company_registry_ingest",
    about = "Companies House bulk ingestion tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a Companies House basic company data CSV
    Run(RunArgs),
    /// Run database migrations
    Migrate,
    /// Print the company count and status breakdown
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the CSV extract, or `-` for standard input
    file: PathBuf,
    /// TOML file with ingestion settings; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Records per insert statement (at most 2730 for `PostgreSQL`)
    #[arg(long)]
    batch_size: Option<usize>,
    /// `fresh` truncates the table first; `resume` loads on top of it
    #[arg(long)]
    mode: Option<LoadMode>,
    /// `skip` keeps existing rows; `merge` overwrites them
    #[arg(long)]
    policy: Option<ConflictPolicy>,
    /// Abort after more than this many rows fail to decode
    #[arg(long)]
    max_decode_failures: Option<u64>,
    /// Abort once the decode failure rate exceeds this fraction
    #[arg(long)]
    max_decode_failure_rate: Option<f64>,
    /// Log failed batches and keep going instead of aborting
    #[arg(long)]
    continue_on_write_error: bool,
    /// Rows between progress lines
    #[arg(long)]
    progress_interval: Option<u64>,
    /// Expected number of data rows, for the ETA
    #[arg(long)]
    expected_total: Option<u64>,
    /// Decode and batch the file, counting rows instead of writing them
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            batch_size: self.batch_size,
            mode: self.mode,
            policy: self.policy,
            max_decode_failures: self.max_decode_failures,
            max_decode_failure_rate: self.max_decode_failure_rate,
            continue_on_write_error: self.continue_on_write_error,
            progress_interval: self.progress_interval,
            expected_total: self.expected_total,
        }
    }
}

async fn load(
    store: &dyn TargetStore,
    file: &Path,
    config: &IngestConfig,
    progress: Arc<dyn ProgressCallback>,
    cancel: &AtomicBool,
) -> Result<IngestSummary, IngestError> {
    if file == Path::new("-") {
        log::info!("Ingesting standard input");
        let stdin = std::io::stdin().lock();
        run_ingestion_from_reader(store, stdin, None, config, Some(progress), cancel).await
    } else {
        run_ingestion(store, file, config, Some(progress), cancel).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = company_registry_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return company_registry_ingest::interactive::run(&multi).await;
    };

    match command {
        Commands::Migrate => {
            log::info!("Running database migrations...");
            let db = db::connect_from_env().await?;
            run_migrations(db.as_ref()).await?;
            log::info!("Migrations complete.");
        }
        Commands::Status => {
            let db = db::connect_from_env().await?;
            let store = PostgresStore::new(db.as_ref());
            for line in report::breakdown_lines(&store.status_breakdown().await?) {
                println!("{line}");
            }
        }
        Commands::Run(args) => {
            let config = config::resolve(args.config.as_deref(), args.overrides())?;
            let progress = RowProgress::rows_bar(&multi, "Reading companies...");
            let cancel = cancel_on_interrupt();

            let result = if args.dry_run {
                log::info!("Dry run: counting rows without writing to the database");
                let store = DryRunStore::new();
                load(&store, &args.file, &config, progress, &cancel).await
            } else {
                let db = db::connect_from_env().await?;
                run_migrations(db.as_ref()).await?;
                let store = PostgresStore::new(db.as_ref());
                load(&store, &args.file, &config, progress, &cancel).await
            };

            result.map_err(|e| e.root_cause().to_string())?;
        }
    }

    Ok(())
}

#![allow(clippy::module_name_repetitions)]

//! Interactive TUI for the company registry ingestion tool.
//!
//! Provides a menu-driven interface using `dialoguer` for configuring and
//! starting a load without memorizing CLI flags.

use std::path::PathBuf;

use company_registry_cli_utils::{RowProgress, MultiProgress};
use company_registry_database::dry_run::DryRunStore;
use company_registry_database::store::{PostgresStore, TargetStore};
use company_registry_database::{db, run_migrations};
use company_registry_ingest_models::{ConflictPolicy, IngestConfig, LoadMode};
use dialoguer::{Confirm, Input, Select};

use crate::config::{self, ConfigOverrides};
use crate::{cancel_on_interrupt, report, run_ingestion};

/// Top-level actions available in the ingest interactive menu.
enum IngestAction {
    LoadCompanies,
    ShowStatus,
    RunMigrations,
}

impl IngestAction {
    const ALL: &[Self] = &[Self::LoadCompanies, Self::ShowStatus, Self::RunMigrations];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::LoadCompanies => "Load a company data CSV",
            Self::ShowStatus => "Show table status",
            Self::RunMigrations => "Run database migrations",
        }
    }
}

/// Runs the interactive menu, prompting the user to select and configure
/// an operation.
///
/// # Errors
///
/// Returns an error if a prompt fails, the database is unreachable, or the
/// selected operation fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = IngestAction::ALL.iter().map(IngestAction::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match IngestAction::ALL[idx] {
        IngestAction::LoadCompanies => load_companies(multi).await?,
        IngestAction::ShowStatus => {
            let db = db::connect_from_env().await?;
            let store = PostgresStore::new(db.as_ref());
            for line in report::breakdown_lines(&store.status_breakdown().await?) {
                println!("{line}");
            }
        }
        IngestAction::RunMigrations => {
            log::info!("Running database migrations...");
            let db = db::connect_from_env().await?;
            run_migrations(db.as_ref()).await?;
            log::info!("Migrations complete.");
        }
    }

    Ok(())
}

/// Prompts for a source file and load settings, then runs the ingestion.
async fn load_companies(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let file: String = Input::new()
        .with_prompt("Path to the company data CSV")
        .interact_text()?;
    let file = PathBuf::from(file.trim());

    let modes = [LoadMode::Fresh, LoadMode::Resume];
    let mode_idx = Select::new()
        .with_prompt("Load mode")
        .items(&["Fresh (truncate table first)", "Resume (keep existing rows)"])
        .default(0)
        .interact()?;
    let mode = modes[mode_idx];

    let policies = [ConflictPolicy::Skip, ConflictPolicy::Merge];
    let policy_idx = Select::new()
        .with_prompt("When a company number already exists")
        .items(&["Skip the incoming row", "Merge the incoming row"])
        .default(0)
        .interact()?;
    let policy = policies[policy_idx];

    let batch_size: usize = Input::new()
        .with_prompt("Records per batch")
        .default(IngestConfig::default().batch_size)
        .interact_text()?;

    let dry_run = Confirm::new()
        .with_prompt("Dry run (count rows, no database writes)?")
        .default(false)
        .interact()?;

    if mode == LoadMode::Fresh && !dry_run {
        let confirmed = Confirm::new()
            .with_prompt("Fresh load deletes every row in the companies table. Continue?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let config = config::resolve(
        None,
        ConfigOverrides {
            batch_size: Some(batch_size),
            mode: Some(mode),
            policy: Some(policy),
            ..ConfigOverrides::default()
        },
    )?;
    let progress = RowProgress::rows_bar(multi, "Reading companies...");
    let cancel = cancel_on_interrupt();

    let result = if dry_run {
        let store = DryRunStore::new();
        run_ingestion(&store, &file, &config, Some(progress), &cancel).await
    } else {
        let db = db::connect_from_env().await?;
        run_migrations(db.as_ref()).await?;
        let store = PostgresStore::new(db.as_ref());
        run_ingestion(&store, &file, &config, Some(progress), &cancel).await
    };

    result.map_err(|e| e.root_cause().to_string())?;
    Ok(())
}

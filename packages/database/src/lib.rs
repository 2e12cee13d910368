#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database connection, queries, and migrations for the company registry.
//!
//! Uses `switchy_database` for raw parameterized SQL and `switchy_schema`
//! for embedded SQL migrations. The ingestion pipeline talks to the
//! database only through the [`store::TargetStore`] trait, which has a
//! `PostgreSQL` implementation, an in-memory one used by tests, and a
//! counting one for dry runs.

pub mod db;
pub mod dry_run;
pub mod memory;
pub mod queries;
pub mod store;

use include_dir::{Dir, include_dir};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Maximum number of parameters `PostgreSQL` allows per statement.
pub const PG_MAX_PARAMS: usize = 65_535;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A statement would bind more parameters than the store accepts.
    #[error("Statement needs {required} bound parameters but the store allows at most {limit}")]
    ParameterLimit {
        /// Parameters the statement would bind.
        required: usize,
        /// The store's per-statement ceiling.
        limit: usize,
    },

    /// The store refused a write for a reason other than the database
    /// driver (used by the in-memory store).
    #[error("Write rejected: {message}")]
    Rejected {
        /// Description of what went wrong.
        message: String,
    },
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("Database migrations completed successfully");
    Ok(())
}

//! The target-store abstraction the ingestion pipeline writes through.

use async_trait::async_trait;
use company_registry_company_models::{CompanyRecord, StatusCount};
use company_registry_ingest_models::{ConflictPolicy, LoadMode};
use switchy_database::Database;

use crate::{DbError, PG_MAX_PARAMS, queries};

/// What [`TargetStore::prepare`] did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOutcome {
    /// Rows in the table before preparation.
    pub existing_rows: u64,
    /// Rows left in the table after preparation.
    pub rows_after_prepare: u64,
    /// Whether secondary indexes were dropped and need a rebuild.
    pub indexes_dropped: bool,
}

/// Result of writing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records in the batch.
    pub total: u64,
    /// Records that created a row.
    pub inserted: u64,
    /// Records that overwrote a row.
    pub updated: u64,
}

impl BatchOutcome {
    /// Records that neither inserted nor updated a row.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.total.saturating_sub(self.inserted + self.updated)
    }
}

/// A relational table keyed by company number that supports bulk upserts.
///
/// Methods take `&self`; one pipeline drives a store at a time.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Most bound parameters a single statement may carry.
    fn max_bound_parameters(&self) -> usize;

    /// Prepares the table for a load. [`LoadMode::Fresh`] empties the table
    /// and drops secondary indexes; [`LoadMode::Resume`] leaves both alone.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be prepared.
    async fn prepare(&self, mode: LoadMode) -> Result<PrepareOutcome, DbError>;

    /// Writes `records` in one statement using `policy` for key conflicts.
    /// Under [`ConflictPolicy::Merge`] the records must have distinct keys.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the statement is rejected.
    async fn write_batch(
        &self,
        records: &[CompanyRecord],
        policy: ConflictPolicy,
    ) -> Result<BatchOutcome, DbError>;

    /// Creates any missing secondary indexes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if an index cannot be built.
    async fn rebuild_indexes(&self) -> Result<(), DbError>;

    /// Refreshes planner statistics.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the refresh fails.
    async fn refresh_statistics(&self) -> Result<(), DbError>;

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the count fails.
    async fn current_row_count(&self) -> Result<u64, DbError>;

    /// Row counts per status, largest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, DbError>;
}

/// [`TargetStore`] over the `companies` table in `PostgreSQL`.
pub struct PostgresStore<'a> {
    db: &'a dyn Database,
}

impl<'a> PostgresStore<'a> {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TargetStore for PostgresStore<'_> {
    fn max_bound_parameters(&self) -> usize {
        PG_MAX_PARAMS
    }

    async fn prepare(&self, mode: LoadMode) -> Result<PrepareOutcome, DbError> {
        let existing_rows = queries::count_companies(self.db).await?;

        match mode {
            LoadMode::Fresh => {
                if existing_rows > 0 {
                    log::info!("Found {existing_rows} existing companies, truncating...");
                }
                queries::truncate_companies(self.db).await?;
                queries::drop_secondary_indexes(self.db).await?;
                log::info!("Table truncated and secondary indexes dropped");
                Ok(PrepareOutcome {
                    existing_rows,
                    rows_after_prepare: 0,
                    indexes_dropped: true,
                })
            }
            LoadMode::Resume => {
                log::info!("Resuming on top of {existing_rows} existing companies");
                Ok(PrepareOutcome {
                    existing_rows,
                    rows_after_prepare: existing_rows,
                    indexes_dropped: false,
                })
            }
        }
    }

    async fn write_batch(
        &self,
        records: &[CompanyRecord],
        policy: ConflictPolicy,
    ) -> Result<BatchOutcome, DbError> {
        let counts = queries::upsert_companies(self.db, records, policy).await?;
        Ok(BatchOutcome {
            total: records.len() as u64,
            inserted: counts.inserted,
            updated: counts.updated,
        })
    }

    async fn rebuild_indexes(&self) -> Result<(), DbError> {
        queries::create_secondary_indexes(self.db).await
    }

    async fn refresh_statistics(&self) -> Result<(), DbError> {
        queries::analyze_companies(self.db).await
    }

    async fn current_row_count(&self) -> Result<u64, DbError> {
        queries::count_companies(self.db).await
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, DbError> {
        queries::status_breakdown(self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_is_what_neither_inserted_nor_updated() {
        let outcome = BatchOutcome {
            total: 10,
            inserted: 6,
            updated: 1,
        };
        assert_eq!(outcome.skipped(), 3);
    }
}

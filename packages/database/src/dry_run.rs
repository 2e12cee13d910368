//! A [`TargetStore`] that accepts writes without keeping them.
//!
//! Memory use is one batch of keys plus one counter per company status, so
//! a dry run over the full extract stays as small as a real load. Keys are
//! forgotten after each batch: a company number repeated across batches
//! counts as inserted both times.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use company_registry_company_models::{CompanyRecord, FIELDS_PER_RECORD, StatusCount};
use company_registry_ingest_models::{ConflictPolicy, LoadMode};

use crate::store::{BatchOutcome, PrepareOutcome, TargetStore};
use crate::{DbError, PG_MAX_PARAMS};

#[derive(Debug, Default)]
struct Tally {
    rows: u64,
    statuses: BTreeMap<Option<String>, u64>,
}

/// Counts what a load would write, per status.
#[derive(Debug, Default)]
pub struct DryRunStore {
    tally: Mutex<Tally>,
}

impl DryRunStore {
    /// Creates an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TargetStore for DryRunStore {
    fn max_bound_parameters(&self) -> usize {
        PG_MAX_PARAMS
    }

    async fn prepare(&self, mode: LoadMode) -> Result<PrepareOutcome, DbError> {
        let mut tally = self.lock();
        let existing_rows = tally.rows;
        if mode == LoadMode::Fresh {
            *tally = Tally::default();
        }

        Ok(PrepareOutcome {
            existing_rows,
            rows_after_prepare: tally.rows,
            indexes_dropped: mode == LoadMode::Fresh,
        })
    }

    async fn write_batch(
        &self,
        records: &[CompanyRecord],
        policy: ConflictPolicy,
    ) -> Result<BatchOutcome, DbError> {
        let required = records.len() * FIELDS_PER_RECORD;
        if required > PG_MAX_PARAMS {
            return Err(DbError::ParameterLimit {
                required,
                limit: PG_MAX_PARAMS,
            });
        }

        let mut seen = BTreeSet::new();
        let mut tally = self.lock();
        let mut outcome = BatchOutcome {
            total: records.len() as u64,
            ..BatchOutcome::default()
        };

        for record in records {
            if !seen.insert(record.company_number.as_str()) {
                if policy == ConflictPolicy::Merge {
                    return Err(DbError::Rejected {
                        message: format!(
                            "company number {} appears twice in one merge batch",
                            record.company_number
                        ),
                    });
                }
                continue;
            }
            outcome.inserted += 1;
            tally.rows += 1;
            *tally
                .statuses
                .entry(record.company_status.clone())
                .or_default() += 1;
        }

        Ok(outcome)
    }

    async fn rebuild_indexes(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn refresh_statistics(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn current_row_count(&self) -> Result<u64, DbError> {
        Ok(self.lock().rows)
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, DbError> {
        let mut breakdown: Vec<StatusCount> = self
            .lock()
            .statuses
            .iter()
            .map(|(status, count)| StatusCount {
                status: status.clone(),
                count: *count,
            })
            .collect();
        breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(keys: &[(&str, &str)]) -> Vec<CompanyRecord> {
        keys.iter()
            .map(|(key, status)| CompanyRecord::new(*key).with_status(*status))
            .collect()
    }

    #[tokio::test]
    async fn counts_rows_and_statuses() {
        let store = DryRunStore::new();
        store.prepare(LoadMode::Fresh).await.unwrap();

        let outcome = store
            .write_batch(
                &records(&[("A1", "Active"), ("A2", "Dissolved"), ("A1", "Active")]),
                ConflictPolicy::Skip,
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped(), 1);
        assert_eq!(store.current_row_count().await.unwrap(), 2);

        let breakdown = store.status_breakdown().await.unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown.iter().map(|s| s.count).sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn keys_are_forgotten_between_batches() {
        let store = DryRunStore::new();
        let batch = records(&[("A1", "Active")]);

        store.write_batch(&batch, ConflictPolicy::Skip).await.unwrap();
        let second = store.write_batch(&batch, ConflictPolicy::Skip).await.unwrap();

        assert_eq!(second.inserted, 1);
        assert_eq!(store.current_row_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fresh_prepare_resets_the_tally() {
        let store = DryRunStore::new();
        store
            .write_batch(&records(&[("A1", "Active")]), ConflictPolicy::Skip)
            .await
            .unwrap();

        let outcome = store.prepare(LoadMode::Fresh).await.unwrap();

        assert_eq!(outcome.existing_rows, 1);
        assert_eq!(outcome.rows_after_prepare, 0);
        assert!(store.status_breakdown().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_rejects_repeated_keys_within_a_batch() {
        let store = DryRunStore::new();
        let batch = records(&[("A1", "Active"), ("A1", "Dissolved")]);

        let result = store.write_batch(&batch, ConflictPolicy::Merge).await;

        assert!(matches!(result, Err(DbError::Rejected { .. })));
    }
}

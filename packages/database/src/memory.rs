//! In-memory [`TargetStore`] used by tests.
//!
//! Every row is kept, so this is only suitable for small inputs. Dry runs
//! over a real extract use [`crate::dry_run::DryRunStore`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use company_registry_company_models::{CompanyRecord, FIELDS_PER_RECORD, StatusCount};
use company_registry_ingest_models::{ConflictPolicy, LoadMode};

use crate::store::{BatchOutcome, PrepareOutcome, TargetStore};
use crate::{DbError, PG_MAX_PARAMS};

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<String, CompanyRecord>,
    indexes_present: bool,
    prepare_calls: u64,
    batches_written: u64,
    largest_batch: usize,
    statistics_refreshes: u64,
}

/// A company table held in a [`BTreeMap`] keyed by company number.
///
/// Follows the same conflict semantics and parameter ceiling as the
/// `PostgreSQL` store.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    max_bound_parameters: usize,
    fail_on_batch: Option<u64>,
    fail_prepare: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with secondary indexes present.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                indexes_present: true,
                ..MemoryState::default()
            }),
            max_bound_parameters: PG_MAX_PARAMS,
            fail_on_batch: None,
            fail_prepare: false,
        }
    }

    /// Seeds the store with existing rows.
    #[must_use]
    pub fn with_rows(self, records: impl IntoIterator<Item = CompanyRecord>) -> Self {
        {
            let mut state = self.lock();
            for record in records {
                state.rows.insert(record.company_number.clone(), record);
            }
        }
        self
    }

    /// Overrides the per-statement parameter ceiling.
    #[must_use]
    pub fn with_max_bound_parameters(mut self, max: usize) -> Self {
        self.max_bound_parameters = max;
        self
    }

    /// Rejects the `n`th write (1-based) with [`DbError::Rejected`].
    #[must_use]
    pub fn failing_on_batch(mut self, n: u64) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    /// Makes [`TargetStore::prepare`] fail. A fresh prepare fails after the
    /// rows and indexes are gone, like a `DROP INDEX` failing part way.
    #[must_use]
    pub fn failing_on_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stored row for `company_number`.
    #[must_use]
    pub fn get(&self, company_number: &str) -> Option<CompanyRecord> {
        self.lock().rows.get(company_number).cloned()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Returns `true` if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Whether secondary indexes currently exist.
    #[must_use]
    pub fn indexes_present(&self) -> bool {
        self.lock().indexes_present
    }

    /// Number of times [`TargetStore::prepare`] ran.
    #[must_use]
    pub fn prepare_calls(&self) -> u64 {
        self.lock().prepare_calls
    }

    /// Number of write attempts, including rejected ones.
    #[must_use]
    pub fn batches_written(&self) -> u64 {
        self.lock().batches_written
    }

    /// Largest batch ever passed to [`TargetStore::write_batch`].
    #[must_use]
    pub fn largest_batch(&self) -> usize {
        self.lock().largest_batch
    }

    /// Number of statistics refreshes.
    #[must_use]
    pub fn statistics_refreshes(&self) -> u64 {
        self.lock().statistics_refreshes
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    fn max_bound_parameters(&self) -> usize {
        self.max_bound_parameters
    }

    async fn prepare(&self, mode: LoadMode) -> Result<PrepareOutcome, DbError> {
        let mut state = self.lock();
        state.prepare_calls += 1;
        let existing_rows = state.rows.len() as u64;

        let rejected = || DbError::Rejected {
            message: "prepare rejected".to_string(),
        };

        Ok(match mode {
            LoadMode::Fresh => {
                state.rows.clear();
                state.indexes_present = false;
                if self.fail_prepare {
                    return Err(rejected());
                }
                PrepareOutcome {
                    existing_rows,
                    rows_after_prepare: 0,
                    indexes_dropped: true,
                }
            }
            LoadMode::Resume => {
                if self.fail_prepare {
                    return Err(rejected());
                }
                PrepareOutcome {
                    existing_rows,
                    rows_after_prepare: existing_rows,
                    indexes_dropped: false,
                }
            }
        })
    }

    async fn write_batch(
        &self,
        records: &[CompanyRecord],
        policy: ConflictPolicy,
    ) -> Result<BatchOutcome, DbError> {
        let mut state = self.lock();
        state.batches_written += 1;
        state.largest_batch = state.largest_batch.max(records.len());

        let required = records.len() * FIELDS_PER_RECORD;
        if required > self.max_bound_parameters {
            return Err(DbError::ParameterLimit {
                required,
                limit: self.max_bound_parameters,
            });
        }

        if self.fail_on_batch == Some(state.batches_written) {
            return Err(DbError::Rejected {
                message: format!("batch {} rejected", state.batches_written),
            });
        }

        if policy == ConflictPolicy::Merge {
            let mut seen = BTreeSet::new();
            if let Some(dup) = records
                .iter()
                .find(|r| !seen.insert(r.company_number.as_str()))
            {
                return Err(DbError::Rejected {
                    message: format!(
                        "company number {} appears twice in one merge batch",
                        dup.company_number
                    ),
                });
            }
        }

        let mut outcome = BatchOutcome {
            total: records.len() as u64,
            ..BatchOutcome::default()
        };

        for record in records {
            match state.rows.entry(record.company_number.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    outcome.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    if policy == ConflictPolicy::Merge {
                        slot.get_mut().clone_from(record);
                        outcome.updated += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn rebuild_indexes(&self) -> Result<(), DbError> {
        self.lock().indexes_present = true;
        Ok(())
    }

    async fn refresh_statistics(&self) -> Result<(), DbError> {
        self.lock().statistics_refreshes += 1;
        Ok(())
    }

    async fn current_row_count(&self) -> Result<u64, DbError> {
        Ok(self.lock().rows.len() as u64)
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, DbError> {
        let state = self.lock();
        let mut counts: BTreeMap<Option<String>, u64> = BTreeMap::new();
        for record in state.rows.values() {
            *counts.entry(record.company_status.clone()).or_default() += 1;
        }

        let mut breakdown: Vec<StatusCount> = counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
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
    async fn fresh_prepare_empties_table_and_drops_indexes() {
        let store = MemoryStore::new().with_rows(records(&[("A1", "Active")]));

        let outcome = store.prepare(LoadMode::Fresh).await.unwrap();

        assert_eq!(outcome.existing_rows, 1);
        assert!(outcome.indexes_dropped);
        assert!(store.is_empty());
        assert!(!store.indexes_present());
    }

    #[tokio::test]
    async fn resume_prepare_keeps_rows() {
        let store = MemoryStore::new().with_rows(records(&[("A1", "Active")]));

        let outcome = store.prepare(LoadMode::Resume).await.unwrap();

        assert_eq!(outcome.rows_after_prepare, 1);
        assert!(!outcome.indexes_dropped);
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn failing_fresh_prepare_leaves_indexes_dropped() {
        let store = MemoryStore::new()
            .with_rows(records(&[("A1", "Active")]))
            .failing_on_prepare();

        assert!(store.prepare(LoadMode::Fresh).await.is_err());
        assert!(!store.indexes_present());

        store.rebuild_indexes().await.unwrap();
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn skip_policy_keeps_first_row_for_a_key() {
        let store = MemoryStore::new();
        let batch = records(&[("A1", "Active"), ("A2", "Active"), ("A1", "Dissolved")]);

        let outcome = store
            .write_batch(&batch, ConflictPolicy::Skip)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped(), 1);
        assert_eq!(
            store.get("A1").unwrap().company_status.as_deref(),
            Some("Active")
        );
    }

    #[tokio::test]
    async fn skip_policy_is_idempotent() {
        let store = MemoryStore::new();
        let batch = records(&[("A1", "Active"), ("B2", "Dissolved")]);

        store.write_batch(&batch, ConflictPolicy::Skip).await.unwrap();
        let second = store.write_batch(&batch, ConflictPolicy::Skip).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn merge_policy_overwrites_and_is_idempotent() {
        let store = MemoryStore::new().with_rows(records(&[("A1", "Active")]));
        let batch = records(&[("A1", "Dissolved")]);

        let first = store.write_batch(&batch, ConflictPolicy::Merge).await.unwrap();
        let snapshot = store.get("A1");
        let second = store.write_batch(&batch, ConflictPolicy::Merge).await.unwrap();

        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 1);
        assert_eq!(store.get("A1"), snapshot);
        assert_eq!(
            snapshot.unwrap().company_status.as_deref(),
            Some("Dissolved")
        );
    }

    #[tokio::test]
    async fn merge_rejects_repeated_keys_within_a_batch() {
        let store = MemoryStore::new();
        let batch = records(&[("A1", "Active"), ("A1", "Dissolved")]);

        let result = store.write_batch(&batch, ConflictPolicy::Merge).await;

        assert!(matches!(result, Err(DbError::Rejected { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn enforces_parameter_ceiling() {
        let store = MemoryStore::new().with_max_bound_parameters(FIELDS_PER_RECORD * 2);
        let batch = records(&[("A1", "Active"), ("A2", "Active"), ("A3", "Active")]);

        let result = store.write_batch(&batch, ConflictPolicy::Skip).await;

        assert!(matches!(
            result,
            Err(DbError::ParameterLimit { required: 72, limit: 48 })
        ));
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_chosen_batch() {
        let store = MemoryStore::new().failing_on_batch(2);

        assert!(
            store
                .write_batch(&records(&[("A1", "Active")]), ConflictPolicy::Skip)
                .await
                .is_ok()
        );
        assert!(
            store
                .write_batch(&records(&[("A2", "Active")]), ConflictPolicy::Skip)
                .await
                .is_err()
        );
        assert!(
            store
                .write_batch(&records(&[("A3", "Active")]), ConflictPolicy::Skip)
                .await
                .is_ok()
        );
        assert_eq!(store.len(), 2);
        assert!(store.get("A2").is_none());
    }

    #[tokio::test]
    async fn status_breakdown_sorts_by_count() {
        let store = MemoryStore::new().with_rows(records(&[
            ("A1", "Active"),
            ("A2", "Dissolved"),
            ("A3", "Active"),
        ]));

        let breakdown = store.status_breakdown().await.unwrap();

        assert_eq!(breakdown[0].status.as_deref(), Some("Active"));
        assert_eq!(breakdown[0].count, 2);
        assert_eq!(breakdown[1].count, 1);
    }
}

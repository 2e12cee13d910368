//! Writes batches to a [`TargetStore`] under a conflict policy.

use std::collections::HashSet;

use company_registry_company_models::{CompanyRecord, FIELDS_PER_RECORD};
use company_registry_database::DbError;
use company_registry_database::store::{BatchOutcome, TargetStore};
use company_registry_ingest_models::ConflictPolicy;

use crate::IngestError;

/// Result of one batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// What the store reported.
    pub batch: BatchOutcome,
    /// Records dropped before the write because a later record in the
    /// same batch had the same key.
    pub collapsed: u64,
}

/// Issues one upsert statement per batch.
pub struct UpsertWriter<'a> {
    store: &'a dyn TargetStore,
    policy: ConflictPolicy,
}

impl std::fmt::Debug for UpsertWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertWriter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> UpsertWriter<'a> {
    /// Creates a writer for batches of up to `batch_size` records.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Configuration`] if `batch_size` is zero or a
    /// full batch would bind more parameters than the store accepts.
    pub fn new(
        store: &'a dyn TargetStore,
        policy: ConflictPolicy,
        batch_size: usize,
    ) -> Result<Self, IngestError> {
        if batch_size == 0 {
            return Err(IngestError::configuration("batch size must be at least 1"));
        }

        let limit = store.max_bound_parameters();
        let max_batch = limit / FIELDS_PER_RECORD;
        if batch_size > max_batch {
            return Err(IngestError::configuration(format!(
                "batch size {batch_size} needs {} bound parameters but the store allows {limit} \
                 (at most {max_batch} records per batch)",
                batch_size.saturating_mul(FIELDS_PER_RECORD),
            )));
        }

        Ok(Self { store, policy })
    }

    /// Writes `batch` in one statement.
    ///
    /// Under [`ConflictPolicy::Merge`], records sharing a key are collapsed
    /// to the last one first.
    ///
    /// # Errors
    ///
    /// Returns the store's [`DbError`] unchanged. Nothing is retried.
    pub async fn write(&self, batch: Vec<CompanyRecord>) -> Result<WriteOutcome, DbError> {
        let (records, collapsed) = match self.policy {
            ConflictPolicy::Skip => (batch, 0),
            ConflictPolicy::Merge => collapse_duplicate_keys(batch),
        };

        let outcome = self.store.write_batch(&records, self.policy).await?;

        Ok(WriteOutcome {
            batch: outcome,
            collapsed,
        })
    }
}

/// Keeps the last record for each key, in the order those last records
/// appeared. Returns the kept records and how many were dropped.
fn collapse_duplicate_keys(batch: Vec<CompanyRecord>) -> (Vec<CompanyRecord>, u64) {
    let before = batch.len();
    let mut seen = HashSet::with_capacity(before);
    let mut kept: Vec<CompanyRecord> = batch
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.company_number.clone()))
        .collect();
    kept.reverse();

    let collapsed = (before - kept.len()) as u64;
    (kept, collapsed)
}

#[cfg(test)]
mod tests {
    use company_registry_database::memory::MemoryStore;

    use super::*;

    fn record(key: &str, status: &str) -> CompanyRecord {
        CompanyRecord::new(key).with_status(status)
    }

    #[test]
    fn rejects_batches_over_the_parameter_ceiling() {
        let store = MemoryStore::new().with_max_bound_parameters(FIELDS_PER_RECORD * 10);

        assert!(UpsertWriter::new(&store, ConflictPolicy::Skip, 10).is_ok());
        assert!(matches!(
            UpsertWriter::new(&store, ConflictPolicy::Skip, 11),
            Err(IngestError::Configuration { .. })
        ));
        assert!(matches!(
            UpsertWriter::new(&store, ConflictPolicy::Skip, 0),
            Err(IngestError::Configuration { .. })
        ));
    }

    #[test]
    fn postgres_ceiling_allows_2730_records() {
        let store = MemoryStore::new();
        assert!(UpsertWriter::new(&store, ConflictPolicy::Merge, 2_730).is_ok());
        assert!(UpsertWriter::new(&store, ConflictPolicy::Merge, 2_731).is_err());
    }

    #[test]
    fn collapse_keeps_last_occurrence_in_order() {
        let (kept, collapsed) = collapse_duplicate_keys(vec![
            record("A1", "Active"),
            record("B2", "Active"),
            record("A1", "Dissolved"),
            record("C3", "Active"),
        ]);

        assert_eq!(collapsed, 1);
        let keys: Vec<&str> = kept.iter().map(|r| r.company_number.as_str()).collect();
        assert_eq!(keys, ["B2", "A1", "C3"]);
        assert_eq!(kept[1].company_status.as_deref(), Some("Dissolved"));
    }

    #[tokio::test]
    async fn merge_write_with_repeated_key_succeeds() {
        let store = MemoryStore::new();
        let writer = UpsertWriter::new(&store, ConflictPolicy::Merge, 10).unwrap();

        let outcome = writer
            .write(vec![record("A1", "Active"), record("A1", "Dissolved")])
            .await
            .unwrap();

        assert_eq!(outcome.batch.inserted, 1);
        assert_eq!(outcome.collapsed, 1);
        assert_eq!(
            store.get("A1").unwrap().company_status.as_deref(),
            Some("Dissolved")
        );
    }

    #[tokio::test]
    async fn skip_write_keeps_first_occurrence() {
        let store = MemoryStore::new();
        let writer = UpsertWriter::new(&store, ConflictPolicy::Skip, 10).unwrap();

        let outcome = writer
            .write(vec![record("A1", "Active"), record("A1", "Dissolved")])
            .await
            .unwrap();

        assert_eq!(outcome.batch.inserted, 1);
        assert_eq!(outcome.batch.skipped(), 1);
        assert_eq!(outcome.collapsed, 0);
        assert_eq!(
            store.get("A1").unwrap().company_status.as_deref(),
            Some("Active")
        );
    }
}

//! Counters for one ingestion run.

use std::time::Instant;

use chrono::{DateTime, Utc};
use company_registry_database::store::BatchOutcome;
use company_registry_ingest_models::{ConflictPolicy, IngestSummary, LoadMode, RunState};

use crate::accumulator::BatchAccumulator;

/// Decode failures logged at `warn` before the rest drop to `debug`.
const LOUD_DECODE_FAILURES: u64 = 20;

/// Mutable state of a run, owned by the controller.
#[derive(Debug)]
pub struct IngestionRun {
    /// Current lifecycle state.
    pub state: RunState,
    /// Load mode of the run.
    pub mode: LoadMode,
    /// Conflict policy of the run.
    pub policy: ConflictPolicy,
    started_at: DateTime<Utc>,
    started: Instant,
    /// Data rows read.
    pub lines_read: u64,
    /// Rows decoded into records.
    pub records_decoded: u64,
    /// Rows that failed to decode.
    pub decode_failures: u64,
    /// Rows inserted.
    pub rows_inserted: u64,
    /// Rows updated.
    pub rows_updated: u64,
    /// Records skipped on conflict.
    pub rows_skipped: u64,
    /// Batches committed.
    pub batches_written: u64,
    /// Batches rejected.
    pub batches_failed: u64,
    /// Records in rejected batches.
    pub records_failed: u64,
    /// The in-flight batch.
    pub batch: BatchAccumulator,
    /// Table row count before the run.
    pub rows_before: u64,
    /// Table row count after the run.
    pub rows_after: Option<u64>,
    /// Whether indexes were dropped during preparation.
    pub indexes_dropped: bool,
    /// Whether indexes were rebuilt during finalization.
    pub indexes_rebuilt: bool,
}

impl IngestionRun {
    /// Starts a run in [`RunState::Preparing`] that writes batches of
    /// `batch_size` records.
    #[must_use]
    pub fn start(mode: LoadMode, policy: ConflictPolicy, batch_size: usize) -> Self {
        Self {
            state: RunState::Preparing,
            mode,
            policy,
            started_at: Utc::now(),
            started: Instant::now(),
            lines_read: 0,
            records_decoded: 0,
            decode_failures: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            batches_written: 0,
            batches_failed: 0,
            records_failed: 0,
            batch: BatchAccumulator::new(batch_size),
            rows_before: 0,
            rows_after: None,
            indexes_dropped: false,
            indexes_rebuilt: false,
        }
    }

    /// Moves to `next`, logging the transition. A run that has reached
    /// [`RunState::Done`] or [`RunState::Aborted`] stays there.
    pub fn transition(&mut self, next: RunState) {
        if self.state.is_terminal() {
            log::warn!("Ignoring {next} transition, run already {}", self.state);
            return;
        }
        log::debug!("Ingestion state: {} -> {next}", self.state);
        self.state = next;
    }

    /// Time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Records a row that failed to decode.
    pub fn record_decode_failure(&mut self, line: u64, error: &impl std::fmt::Display) {
        self.decode_failures += 1;
        if self.decode_failures <= LOUD_DECODE_FAILURES {
            log::warn!("Skipping line {line}: {error}");
            if self.decode_failures == LOUD_DECODE_FAILURES {
                log::warn!("Further decode failures are logged at debug level");
            }
        } else {
            log::debug!("Skipping line {line}: {error}");
        }
    }

    /// Adds one committed batch to the totals. `collapsed` counts records
    /// dropped before the write because their key repeated in the batch.
    pub fn record_batch(&mut self, outcome: &BatchOutcome, collapsed: u64) {
        self.batches_written += 1;
        self.rows_inserted += outcome.inserted;
        self.rows_updated += outcome.updated;
        self.rows_skipped += outcome.skipped() + collapsed;
    }

    /// Adds one rejected batch of `records` records.
    pub fn record_failed_batch(&mut self, records: u64) {
        self.batches_failed += 1;
        self.records_failed += records;
    }

    /// Records inserted or updated so far.
    #[must_use]
    pub const fn rows_committed(&self) -> u64 {
        self.rows_inserted + self.rows_updated
    }

    /// Freezes the counters into a summary.
    #[must_use]
    pub fn into_summary(self, abort_reason: Option<String>) -> IngestSummary {
        IngestSummary {
            state: self.state,
            mode: self.mode,
            policy: self.policy,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            lines_read: self.lines_read,
            records_decoded: self.records_decoded,
            decode_failures: self.decode_failures,
            rows_inserted: self.rows_inserted,
            rows_updated: self.rows_updated,
            rows_skipped: self.rows_skipped,
            batches_written: self.batches_written,
            batches_failed: self.batches_failed,
            records_failed: self.records_failed,
            peak_buffered: self.batch.peak_len() as u64,
            rows_before: self.rows_before,
            rows_after: self.rows_after,
            indexes_rebuilt: self.indexes_rebuilt,
            abort_reason,
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion configuration, run state, and summary types.

pub mod progress;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Whether a run starts from an empty table or loads on top of existing
/// rows.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LoadMode {
    /// Truncate the table and drop secondary indexes before loading.
    #[default]
    Fresh,
    /// Keep existing rows and indexes; overlap is reconciled by the
    /// conflict policy.
    Resume,
}

/// What to do when an incoming record's company number already exists.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConflictPolicy {
    /// Keep the stored row and ignore the incoming one.
    #[default]
    Skip,
    /// Overwrite the stored row's mutable fields with the incoming ones.
    Merge,
}

/// Lifecycle of one ingestion run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    /// Validating configuration and preparing the target table.
    Preparing,
    /// Reading the source and writing batches.
    Streaming,
    /// Flushing the last batch, rebuilding indexes, refreshing statistics.
    Finalizing,
    /// Finished successfully.
    Done,
    /// Stopped early because of an unrecoverable error.
    Aborted,
}

impl RunState {
    /// Returns `true` for [`RunState::Done`] and [`RunState::Aborted`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// Tunables for one ingestion run.
///
/// Every field has a default, so a TOML config file only needs to list the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Records per insert statement. `batch_size * 24` must not exceed the
    /// store's bound parameter ceiling.
    pub batch_size: usize,
    /// Fresh load or resume.
    pub mode: LoadMode,
    /// Conflict resolution for duplicate company numbers.
    pub policy: ConflictPolicy,
    /// Emit a status line every this many source rows.
    pub progress_interval: u64,
    /// Abort once more than this many rows have failed to decode.
    pub max_decode_failures: Option<u64>,
    /// Abort once the share of rows that failed to decode exceeds this
    /// fraction (0.0 - 1.0). Only checked after `min_rate_sample` rows.
    pub max_decode_failure_rate: Option<f64>,
    /// Rows to read before the failure rate is enforced.
    pub min_rate_sample: u64,
    /// Log a failed batch and keep going instead of aborting.
    pub continue_on_write_error: bool,
    /// Known number of data rows in the source, used for the ETA. When
    /// unset, the total is estimated from the bytes read so far.
    pub expected_total: Option<u64>,
}

/// Default records per statement: 2000 * 24 = 48 000 parameters, well
/// under the `PostgreSQL` limit of 65 535.
pub const DEFAULT_BATCH_SIZE: usize = 2_000;

/// Default number of rows between progress lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mode: LoadMode::Fresh,
            policy: ConflictPolicy::Skip,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_decode_failures: Some(1_000),
            max_decode_failure_rate: Some(0.01),
            min_rate_sample: 10_000,
            continue_on_write_error: false,
            expected_total: None,
        }
    }
}

/// Final counters of an ingestion run, emitted on success and on abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    /// Terminal state of the run.
    pub state: RunState,
    /// Load mode the run used.
    pub mode: LoadMode,
    /// Conflict policy the run used.
    pub policy: ConflictPolicy,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Data rows read from the source (header excluded).
    pub lines_read: u64,
    /// Rows that decoded into a record.
    pub records_decoded: u64,
    /// Rows that failed to decode and were skipped.
    pub decode_failures: u64,
    /// Records that created a new row.
    pub rows_inserted: u64,
    /// Records that overwrote an existing row (merge policy only).
    pub rows_updated: u64,
    /// Records ignored because their key already existed or repeated
    /// within a batch.
    pub rows_skipped: u64,
    /// Batches committed.
    pub batches_written: u64,
    /// Batches the store rejected.
    pub batches_failed: u64,
    /// Records in batches the store rejected.
    pub records_failed: u64,
    /// Most records held in memory at once while batching.
    pub peak_buffered: u64,
    /// Table row count before the run.
    pub rows_before: u64,
    /// Table row count after the run, if it could be read.
    pub rows_after: Option<u64>,
    /// Whether secondary indexes were rebuilt at the end.
    pub indexes_rebuilt: bool,
    /// Why the run aborted, if it did.
    pub abort_reason: Option<String>,
}

impl IngestSummary {
    /// Records written to the store, new or updated.
    #[must_use]
    pub const fn rows_committed(&self) -> u64 {
        self.rows_inserted + self.rows_updated
    }

    /// Average source rows per second over the whole run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rows_per_second(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.lines_read as f64 / secs)
    }
}

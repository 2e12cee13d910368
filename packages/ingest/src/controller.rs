//! Drives one ingestion run from source file to committed table.
//!
//! The run moves through `Preparing -> Streaming -> Finalizing -> Done`,
//! or to `Aborted` from any of the first three. Each full batch is written
//! before the next row is read, so at most one batch of records is held in
//! memory. Cancellation is checked after every batch write.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use company_registry_company_models::CompanyRecord;
use company_registry_database::store::TargetStore;
use company_registry_ingest_models::progress::{ProgressCallback, null_progress};
use company_registry_ingest_models::{IngestConfig, IngestSummary, LoadMode, RunState};
use company_registry_source::{CompanyCsvReader, SourceError, SourceRow};

use crate::IngestError;
use crate::config;
use crate::report;
use crate::run::IngestionRun;
use crate::writer::UpsertWriter;

/// Loads the CSV at `source` into `store`.
///
/// Configuration is validated and the source header is read before the
/// store is touched. `cancel` is polled after every batch write; once it
/// is set the run stops with [`IngestError::Cancelled`].
///
/// # Errors
///
/// * [`IngestError::Configuration`] if the config is invalid, a full batch
///   exceeds the store's parameter ceiling, or the source cannot be opened
///   or lacks a company number column. Nothing has been written.
/// * [`IngestError::Aborted`] if the run failed after preparation began.
///   It carries the summary and the underlying cause.
pub async fn run_ingestion(
    store: &dyn TargetStore,
    source: &Path,
    config: &IngestConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
    cancel: &AtomicBool,
) -> Result<IngestSummary, IngestError> {
    log::info!("Ingesting {}", source.display());
    ingest(store, CompanyCsvReader::open(source), config, progress, cancel).await
}

/// Loads CSV from any reader into `store`.
///
/// `total_bytes` is the input size when known and is only used to estimate
/// the row total for progress output.
///
/// # Errors
///
/// Same as [`run_ingestion`]. A read failure after the header is an
/// [`IngestError::Aborted`] wrapping [`IngestError::Source`].
pub async fn run_ingestion_from_reader<R: Read>(
    store: &dyn TargetStore,
    source: R,
    total_bytes: Option<u64>,
    config: &IngestConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
    cancel: &AtomicBool,
) -> Result<IngestSummary, IngestError> {
    let reader = CompanyCsvReader::from_reader(source, total_bytes);
    ingest(store, reader, config, progress, cancel).await
}

async fn ingest<R: Read>(
    store: &dyn TargetStore,
    reader: Result<CompanyCsvReader<R>, SourceError>,
    config: &IngestConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
    cancel: &AtomicBool,
) -> Result<IngestSummary, IngestError> {
    config::validate(config)?;
    let writer = UpsertWriter::new(store, config.policy, config.batch_size)?;
    let reader = reader.map_err(|e| IngestError::configuration(e.to_string()))?;

    log::info!(
        "{} load, {} policy, batch size {}",
        config.mode,
        config.policy,
        config.batch_size
    );

    let progress = progress.unwrap_or_else(null_progress);
    Pipeline::new(store, writer, reader, config, progress.as_ref(), cancel)
        .execute()
        .await
}

/// Returns a flag that is set when the process receives Ctrl-C.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn cancel_on_interrupt() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current batch...");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

struct Pipeline<'a, R: Read> {
    store: &'a dyn TargetStore,
    writer: UpsertWriter<'a>,
    reader: CompanyCsvReader<R>,
    config: &'a IngestConfig,
    progress: &'a dyn ProgressCallback,
    cancel: &'a AtomicBool,
    run: IngestionRun,
    reported_total: Option<u64>,
}

impl<'a, R: Read> Pipeline<'a, R> {
    fn new(
        store: &'a dyn TargetStore,
        writer: UpsertWriter<'a>,
        reader: CompanyCsvReader<R>,
        config: &'a IngestConfig,
        progress: &'a dyn ProgressCallback,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            store,
            writer,
            reader,
            config,
            progress,
            cancel,
            run: IngestionRun::start(config.mode, config.policy, config.batch_size),
            reported_total: None,
        }
    }

    async fn execute(mut self) -> Result<IngestSummary, IngestError> {
        if let Err(e) = self.prepare().await {
            return Err(self.abort(e).await);
        }

        self.run.transition(RunState::Streaming);
        if let Err(e) = self.stream().await {
            return Err(self.abort(e).await);
        }

        self.run.transition(RunState::Finalizing);
        if let Err(e) = self.finalize().await {
            return Err(self.abort(e).await);
        }

        self.run.transition(RunState::Done);
        let summary = self.run.into_summary(None);
        for line in report::summary_lines(&summary) {
            log::info!("{line}");
        }
        self.progress.finish(format!(
            "Done: {} inserted, {} updated, {} skipped",
            summary.rows_inserted, summary.rows_updated, summary.rows_skipped
        ));
        Ok(summary)
    }

    async fn prepare(&mut self) -> Result<(), IngestError> {
        // A fresh prepare can fail after dropping some indexes.
        self.run.indexes_dropped = self.config.mode == LoadMode::Fresh;
        let prepared = self.store.prepare(self.config.mode).await?;
        self.run.rows_before = prepared.existing_rows;
        self.run.indexes_dropped = prepared.indexes_dropped;
        log::info!(
            "Target table had {} rows, {} remain after preparation",
            prepared.existing_rows,
            prepared.rows_after_prepare
        );

        if let Some(total) = self.config.expected_total {
            self.report_total(total);
        }
        Ok(())
    }

    async fn stream(&mut self) -> Result<(), IngestError> {
        while let Some(row) = self.reader.next_row()? {
            self.run.lines_read += 1;

            match row {
                SourceRow::Decoded(record) => {
                    self.run.records_decoded += 1;
                    if let Some(batch) = self.run.batch.add(record) {
                        self.write(batch).await?;
                        self.progress.set_position(self.run.lines_read);
                        if self.cancel.load(Ordering::SeqCst) {
                            log::warn!(
                                "Cancellation requested, stopping after {} rows",
                                self.run.lines_read
                            );
                            return Err(IngestError::Cancelled);
                        }
                    }
                }
                SourceRow::Rejected { line, error } => {
                    self.run.record_decode_failure(line, &error);
                    self.check_decode_thresholds()?;
                }
            }

            if self.run.lines_read % self.config.progress_interval == 0 {
                self.report_progress();
            }
        }

        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), IngestError> {
        if let Some(batch) = self.run.batch.flush_remainder() {
            log::debug!("Flushing final batch of {} records", batch.len());
            self.write(batch).await?;
        }
        self.progress.set_position(self.run.lines_read);

        if self.run.indexes_dropped {
            self.progress.set_message("Rebuilding secondary indexes".to_string());
            log::info!("Rebuilding secondary indexes...");
            self.store.rebuild_indexes().await?;
            self.run.indexes_rebuilt = true;
        }

        log::info!("Refreshing table statistics...");
        self.store.refresh_statistics().await?;
        self.run.rows_after = Some(self.store.current_row_count().await?);

        match self.store.status_breakdown().await {
            Ok(breakdown) => {
                for line in report::breakdown_lines(&breakdown) {
                    log::info!("{line}");
                }
            }
            Err(e) => log::warn!("Could not read status breakdown: {e}"),
        }

        Ok(())
    }

    async fn write(&mut self, batch: Vec<CompanyRecord>) -> Result<(), IngestError> {
        let len = batch.len() as u64;
        match self.writer.write(batch).await {
            Ok(outcome) => {
                self.run.record_batch(&outcome.batch, outcome.collapsed);
                log::debug!(
                    "Batch {}: {} inserted, {} updated, {} skipped",
                    self.run.batches_written,
                    outcome.batch.inserted,
                    outcome.batch.updated,
                    outcome.batch.skipped() + outcome.collapsed
                );
                Ok(())
            }
            Err(e) => {
                self.run.record_failed_batch(len);
                if self.config.continue_on_write_error {
                    log::error!(
                        "Batch of {len} records failed, continuing ({} failed so far): {e}",
                        self.run.batches_failed
                    );
                    Ok(())
                } else {
                    Err(IngestError::Write(e))
                }
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn check_decode_thresholds(&self) -> Result<(), IngestError> {
        let failures = self.run.decode_failures;
        let lines = self.run.lines_read;

        if let Some(max) = self.config.max_decode_failures
            && failures > max
        {
            return Err(IngestError::ThresholdExceeded {
                failures,
                lines,
                reason: format!("more than {max} failures"),
            });
        }

        if let Some(max_rate) = self.config.max_decode_failure_rate
            && lines >= self.config.min_rate_sample
            && lines > 0
        {
            let rate = failures as f64 / lines as f64;
            if rate > max_rate {
                return Err(IngestError::ThresholdExceeded {
                    failures,
                    lines,
                    reason: format!("failure rate {rate:.4} above {max_rate}"),
                });
            }
        }

        Ok(())
    }

    fn report_progress(&mut self) {
        let total = self.config.expected_total.or_else(|| {
            self.reader.total_bytes().and_then(|total_bytes| {
                report::estimate_total_from_bytes(
                    self.run.lines_read,
                    self.reader.bytes_read(),
                    total_bytes,
                )
            })
        });
        let estimate = report::estimate(self.run.lines_read, self.run.elapsed(), total);
        let line = report::status_line(
            self.run.lines_read,
            self.run.rows_committed(),
            self.run.decode_failures,
            total,
            &estimate,
        );

        log::info!("{line}");
        if let Some(total) = total {
            self.report_total(total);
        }
        self.progress.set_position(self.run.lines_read);
        self.progress.set_message(line);
    }

    fn report_total(&mut self, total: u64) {
        if self.reported_total != Some(total) {
            self.reported_total = Some(total);
            self.progress.set_total(total);
        }
    }

    async fn abort(mut self, cause: IngestError) -> IngestError {
        log::error!("Ingestion aborted while {}: {cause}", self.run.state);

        if self.run.indexes_dropped && !self.run.indexes_rebuilt {
            log::info!("Rebuilding secondary indexes before exit...");
            match self.store.rebuild_indexes().await {
                Ok(()) => self.run.indexes_rebuilt = true,
                Err(e) => log::error!("Failed to rebuild secondary indexes: {e}"),
            }
        }

        self.run.rows_after = match self.store.current_row_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                log::warn!("Could not count rows after abort: {e}");
                None
            }
        };

        self.run.transition(RunState::Aborted);
        let summary = self.run.into_summary(Some(cause.to_string()));
        for line in report::summary_lines(&summary) {
            log::info!("{line}");
        }
        self.progress.finish(format!("Aborted: {cause}"));

        IngestError::Aborted {
            summary: Box::new(summary),
            source: Box::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use company_registry_company_models::FIELDS_PER_RECORD;
    use company_registry_database::dry_run::DryRunStore;
    use company_registry_database::memory::MemoryStore;
    use company_registry_ingest_models::{ConflictPolicy, LoadMode};

    use super::*;

    const HEADER: &str = "CompanyName, CompanyNumber,RegAddress.CareOf,RegAddress.POBox,\
RegAddress.AddressLine1, RegAddress.AddressLine2,RegAddress.PostTown,RegAddress.County,\
RegAddress.Country,RegAddress.PostCode,CompanyCategory,CompanyStatus,CountryOfOrigin,\
DissolutionDate,IncorporationDate,Accounts.AccountRefDay,Accounts.AccountRefMonth,\
Accounts.NextDueDate,Accounts.LastMadeUpDate,Accounts.AccountCategory,\
SICCode.SicText_1,SICCode.SicText_2,SICCode.SicText_3,SICCode.SicText_4";

    fn row(number: &str, status: &str) -> String {
        format!(
            "\"{number} LTD\",{number},,,\"1 High St\",,LONDON,,UNITED KINGDOM,\"EC1A 1BB\",\
Private Limited Company,{status},United Kingdom,,01/02/2003,31,12,30/09/2024,31/12/2022,\
MICRO ENTITY,\"62020 - Information technology consultancy activities\",,,"
        )
    }

    struct Fixture {
        path: PathBuf,
    }

    impl Fixture {
        fn new(name: &str, rows: &[String]) -> Self {
            let path = std::env::temp_dir().join(format!("company_registry_{name}.csv"));
            let mut body = String::from(HEADER);
            body.push('\n');
            for r in rows {
                body.push_str(r);
                body.push('\n');
            }
            std::fs::write(&path, body).unwrap();
            Self { path }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_file(&self.path).ok();
        }
    }

    fn config(mode: LoadMode, policy: ConflictPolicy, batch_size: usize) -> IngestConfig {
        IngestConfig {
            batch_size,
            mode,
            policy,
            ..IngestConfig::default()
        }
    }

    async fn ingest(
        store: &MemoryStore,
        fixture: &Fixture,
        config: &IngestConfig,
    ) -> Result<IngestSummary, IngestError> {
        run_ingestion(store, &fixture.path, config, None, &AtomicBool::new(false)).await
    }

    #[tokio::test]
    async fn fresh_load_with_repeated_key_skips_the_repeat() {
        let fixture = Fixture::new(
            "fresh_repeat",
            &[row("A1", "Active"), row("A2", "Active"), row("A1", "Dissolved")],
        );
        let store = MemoryStore::new().with_rows([CompanyRecord::new("OLD")]);

        let summary = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 10),
        )
        .await
        .unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.lines_read, 3);
        assert_eq!(summary.rows_inserted, 2);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.rows_before, 1);
        assert_eq!(summary.rows_after, Some(2));
        assert!(summary.indexes_rebuilt);
        assert!(store.indexes_present());
        assert_eq!(store.statistics_refreshes(), 1);
        assert!(store.get("OLD").is_none());
        assert_eq!(
            store.get("A1").unwrap().company_status.as_deref(),
            Some("Active")
        );
    }

    #[tokio::test]
    async fn resume_with_merge_updates_existing_rows() {
        let fixture = Fixture::new("resume_merge", &[row("A1", "Dissolved")]);
        let store = MemoryStore::new()
            .with_rows([CompanyRecord::new("A1").with_status("Active")]);

        let summary = ingest(
            &store,
            &fixture,
            &config(LoadMode::Resume, ConflictPolicy::Merge, 10),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows_updated, 1);
        assert_eq!(summary.rows_inserted, 0);
        assert_eq!(summary.rows_before, 1);
        assert_eq!(summary.rows_after, Some(1));
        assert!(!summary.indexes_rebuilt);

        let a1 = store.get("A1").unwrap();
        assert_eq!(a1.company_status.as_deref(), Some("Dissolved"));
        assert_eq!(a1.address.post_town.as_deref(), Some("LONDON"));
    }

    #[tokio::test]
    async fn keyless_row_is_counted_and_skipped() {
        let mut rows: Vec<String> = (0..9).map(|i| row(&format!("K{i}"), "Active")).collect();
        rows.insert(4, row("", "Active"));
        let fixture = Fixture::new("keyless_row", &rows);
        let store = MemoryStore::new();

        let summary = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 4),
        )
        .await
        .unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.lines_read, 10);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.rows_inserted, 9);
        assert_eq!(store.len(), 9);
    }

    #[tokio::test]
    async fn batch_over_parameter_ceiling_never_prepares_the_store() {
        let fixture = Fixture::new("ceiling", &[row("A1", "Active")]);
        let store = MemoryStore::new()
            .with_rows([CompanyRecord::new("KEEP")])
            .with_max_bound_parameters(FIELDS_PER_RECORD * 100);

        let result = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 101),
        )
        .await;

        assert!(matches!(result, Err(IngestError::Configuration { .. })));
        assert_eq!(store.prepare_calls(), 0);
        assert!(store.get("KEEP").is_some());
    }

    #[tokio::test]
    async fn missing_source_is_a_configuration_error() {
        let store = MemoryStore::new();
        let result = run_ingestion(
            &store,
            Path::new("/nonexistent/company_registry.csv"),
            &IngestConfig::default(),
            None,
            &AtomicBool::new(false),
        )
        .await;

        assert!(matches!(result, Err(IngestError::Configuration { .. })));
        assert_eq!(store.prepare_calls(), 0);
    }

    #[tokio::test]
    async fn memory_stays_bounded_by_batch_size() {
        let rows: Vec<String> = (0..1_000).map(|i| row(&format!("N{i:05}"), "Active")).collect();
        let fixture = Fixture::new("bounded", &rows);
        let store = MemoryStore::new();

        let summary = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 64),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows_inserted, 1_000);
        assert!(summary.peak_buffered <= 64);
        assert!(store.largest_batch() <= 64);
        assert_eq!(store.batches_written(), 16);
    }

    #[tokio::test]
    async fn write_error_aborts_and_still_rebuilds_indexes() {
        let rows: Vec<String> = (0..10).map(|i| row(&format!("W{i}"), "Active")).collect();
        let fixture = Fixture::new("write_error", &rows);
        let store = MemoryStore::new().failing_on_batch(2);

        let err = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 3),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), IngestError::Write(_)));
        let summary = err.summary().unwrap();
        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.rows_inserted, 3);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.rows_after, Some(3));
        assert!(summary.indexes_rebuilt);
        assert!(summary.abort_reason.is_some());
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn continue_on_write_error_keeps_going() {
        let rows: Vec<String> = (0..10).map(|i| row(&format!("C{i}"), "Active")).collect();
        let fixture = Fixture::new("continue_on_error", &rows);
        let store = MemoryStore::new().failing_on_batch(2);
        let config = IngestConfig {
            continue_on_write_error: true,
            ..config(LoadMode::Fresh, ConflictPolicy::Skip, 3)
        };

        let summary = ingest(&store, &fixture, &config).await.unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.records_failed, 3);
        assert_eq!(summary.rows_inserted, 7);
    }

    #[tokio::test]
    async fn too_many_decode_failures_abort_the_run() {
        let rows: Vec<String> = (0..5).map(|_| row("", "Active")).collect();
        let fixture = Fixture::new("threshold", &rows);
        let store = MemoryStore::new();
        let config = IngestConfig {
            max_decode_failures: Some(2),
            ..config(LoadMode::Fresh, ConflictPolicy::Skip, 10)
        };

        let err = ingest(&store, &fixture, &config).await.unwrap_err();

        assert!(matches!(
            err.root_cause(),
            IngestError::ThresholdExceeded { failures: 3, .. }
        ));
        assert_eq!(err.summary().unwrap().lines_read, 3);
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn failure_rate_applies_after_minimum_sample() {
        let mut rows: Vec<String> = (0..8).map(|i| row(&format!("R{i}"), "Active")).collect();
        rows.push(row("", "Active"));
        rows.push(row("", "Active"));
        let fixture = Fixture::new("failure_rate", &rows);
        let store = MemoryStore::new();
        let config = IngestConfig {
            max_decode_failures: None,
            max_decode_failure_rate: Some(0.1),
            min_rate_sample: 5,
            ..config(LoadMode::Fresh, ConflictPolicy::Skip, 4)
        };

        let err = ingest(&store, &fixture, &config).await.unwrap_err();

        assert!(matches!(
            err.root_cause(),
            IngestError::ThresholdExceeded { failures: 1, lines: 9, .. }
        ));
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn cancellation_stops_at_a_batch_boundary() {
        let rows: Vec<String> = (0..10).map(|i| row(&format!("X{i}"), "Active")).collect();
        let fixture = Fixture::new("cancel", &rows);
        let store = MemoryStore::new();

        let err = run_ingestion(
            &store,
            &fixture.path,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 4),
            None,
            &AtomicBool::new(true),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), IngestError::Cancelled));
        assert_eq!(store.len(), 4);
        assert_eq!(err.summary().unwrap().lines_read, 4);
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn rerunning_a_skip_load_is_idempotent() {
        let rows: Vec<String> = (0..5).map(|i| row(&format!("I{i}"), "Active")).collect();
        let fixture = Fixture::new("idempotent", &rows);
        let store = MemoryStore::new();

        ingest(&store, &fixture, &config(LoadMode::Fresh, ConflictPolicy::Skip, 2))
            .await
            .unwrap();
        let second = ingest(
            &store,
            &fixture,
            &config(LoadMode::Resume, ConflictPolicy::Skip, 2),
        )
        .await
        .unwrap();

        assert_eq!(second.rows_inserted, 0);
        assert_eq!(second.rows_skipped, 5);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn invalid_key_is_a_decode_failure_not_a_failed_batch() {
        let rows = vec![
            row("01234567", "Active"),
            row("NOTACOMPANYNUMBER", "Active"),
            row("SC000001", "Active"),
        ];
        let fixture = Fixture::new("invalid_key", &rows);
        let store = MemoryStore::new();

        let summary = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 10),
        )
        .await
        .unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.batches_failed, 0);
        assert_eq!(summary.rows_inserted, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn failed_fresh_prepare_still_rebuilds_indexes() {
        let fixture = Fixture::new("prepare_fails", &[row("A1", "Active")]);
        let store = MemoryStore::new()
            .with_rows([CompanyRecord::new("OLD")])
            .failing_on_prepare();

        let err = ingest(
            &store,
            &fixture,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), IngestError::Write(_)));
        let summary = err.summary().unwrap();
        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.lines_read, 0);
        assert!(summary.indexes_rebuilt);
        assert!(store.indexes_present());
    }

    #[tokio::test]
    async fn failed_resume_prepare_leaves_indexes_alone() {
        let fixture = Fixture::new("resume_prepare_fails", &[row("A1", "Active")]);
        let store = MemoryStore::new().failing_on_prepare();

        let err = ingest(
            &store,
            &fixture,
            &config(LoadMode::Resume, ConflictPolicy::Skip, 10),
        )
        .await
        .unwrap_err();

        let summary = err.summary().unwrap();
        assert_eq!(summary.state, RunState::Aborted);
        assert!(!summary.indexes_rebuilt);
        assert!(store.indexes_present());
    }

    /// Yields `data` up to `fail_at` bytes, then fails every read.
    struct BrokenSource {
        data: Vec<u8>,
        pos: usize,
        fail_at: usize,
    }

    impl Read for BrokenSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = self.fail_at.min(self.data.len());
            if self.pos >= end {
                return Err(std::io::Error::other("device went away"));
            }
            let n = buf.len().min(end - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[tokio::test]
    async fn read_failure_mid_stream_aborts_and_rebuilds_indexes() {
        let mut body = format!("{HEADER}\n");
        for i in 0..5 {
            body.push_str(&row(&format!("S{i}"), "Active"));
            body.push('\n');
        }
        let fail_at = body.len();
        for i in 5..10 {
            body.push_str(&row(&format!("S{i}"), "Active"));
            body.push('\n');
        }
        let source = BrokenSource {
            data: body.into_bytes(),
            pos: 0,
            fail_at,
        };
        let store = MemoryStore::new();

        let err = run_ingestion_from_reader(
            &store,
            source,
            None,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 2),
            None,
            &AtomicBool::new(false),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), IngestError::Source(_)));
        let summary = err.summary().unwrap();
        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.lines_read, 5);
        assert!(summary.indexes_rebuilt);
        assert!(store.indexes_present());
        assert_eq!(store.len(), 4);
    }

    #[derive(Default)]
    struct RecordedTotals(std::sync::Mutex<Vec<u64>>);

    impl ProgressCallback for RecordedTotals {
        fn set_total(&self, total: u64) {
            self.0.lock().unwrap().push(total);
        }
        fn set_position(&self, _pos: u64) {}
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
    }

    #[tokio::test]
    async fn unchanged_total_is_reported_once() {
        let rows: Vec<String> = (0..6).map(|i| row(&format!("T{i}"), "Active")).collect();
        let fixture = Fixture::new("reported_total", &rows);
        let store = MemoryStore::new();
        let totals = Arc::new(RecordedTotals::default());
        let config = IngestConfig {
            expected_total: Some(6),
            progress_interval: 1,
            ..config(LoadMode::Fresh, ConflictPolicy::Skip, 2)
        };

        run_ingestion(
            &store,
            &fixture.path,
            &config,
            Some(Arc::clone(&totals) as Arc<dyn ProgressCallback>),
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

        assert_eq!(*totals.0.lock().unwrap(), vec![6]);
    }

    #[tokio::test]
    async fn dry_run_counts_without_a_database() {
        let rows: Vec<String> = (0..7).map(|i| row(&format!("D{i}"), "Active")).collect();
        let fixture = Fixture::new("dry_run", &rows);
        let store = DryRunStore::new();

        let summary = run_ingestion(
            &store,
            &fixture.path,
            &config(LoadMode::Fresh, ConflictPolicy::Skip, 3),
            None,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.rows_inserted, 7);
        assert_eq!(summary.rows_after, Some(7));
        assert!(summary.peak_buffered <= 3);
    }
}

//! Throughput and ETA calculation for progress lines.

use std::time::Duration;

use company_registry_company_models::StatusCount;
use company_registry_ingest_models::IngestSummary;

/// Rate and remaining time derived from a progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    /// Rows per second, unknown when no time has elapsed.
    pub rate: Option<f64>,
    /// Time until `total` rows are processed, unknown without a total or
    /// a rate.
    pub eta: Option<Duration>,
}

/// Computes the processing rate and, when `total` is known, the time left.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(processed: u64, elapsed: Duration, total: Option<u64>) -> ProgressEstimate {
    let secs = elapsed.as_secs_f64();
    let rate = (secs > 0.0).then(|| processed as f64 / secs);

    let eta = match (rate, total) {
        (Some(rate), Some(total)) if rate > 0.0 => {
            let remaining = total.saturating_sub(processed) as f64;
            Duration::try_from_secs_f64(remaining / rate).ok()
        }
        _ => None,
    };

    ProgressEstimate { rate, eta }
}

/// Extrapolates the total row count from the share of the file consumed
/// so far.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_total_from_bytes(processed: u64, bytes_read: u64, total_bytes: u64) -> Option<u64> {
    if processed == 0 || bytes_read == 0 || total_bytes == 0 {
        return None;
    }
    if bytes_read >= total_bytes {
        return Some(processed);
    }
    let fraction = bytes_read as f64 / total_bytes as f64;
    Some(((processed as f64) / fraction).round() as u64)
}

/// Renders a duration as `1h02m03s`, `4m05s`, or `6s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Builds the periodic status line.
#[must_use]
pub fn status_line(
    processed: u64,
    committed: u64,
    failures: u64,
    total: Option<u64>,
    estimate: &ProgressEstimate,
) -> String {
    let mut line = total.map_or_else(
        || format!("Processed {processed} rows"),
        |total| format!("Processed {processed}/~{total} rows"),
    );
    line.push_str(&format!(", {committed} committed, {failures} decode failures"));

    if let Some(rate) = estimate.rate {
        line.push_str(&format!(", {rate:.0} rows/s"));
    }
    if let Some(eta) = estimate.eta {
        line.push_str(&format!(", ETA {}", format_duration(eta)));
    }
    line
}

/// Lines printed at the end of every run, successful or not.
#[must_use]
pub fn summary_lines(summary: &IngestSummary) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Ingestion {} ({} load, {} policy) in {}",
            summary.state,
            summary.mode,
            summary.policy,
            format_duration(summary.elapsed)
        ),
        format!(
            "  processed {} rows: {} decoded, {} decode failures",
            summary.lines_read, summary.records_decoded, summary.decode_failures
        ),
        format!(
            "  inserted {}, updated {}, skipped {}",
            summary.rows_inserted, summary.rows_updated, summary.rows_skipped
        ),
        format!(
            "  batches written {}, failed {} ({} records)",
            summary.batches_written, summary.batches_failed, summary.records_failed
        ),
    ];

    if let Some(rate) = summary.rows_per_second() {
        lines.push(format!("  average rate {rate:.0} rows/s"));
    }

    let after = summary
        .rows_after
        .map_or_else(|| "unknown".to_string(), |n| n.to_string());
    lines.push(format!(
        "  table rows before {}, after {after}",
        summary.rows_before
    ));

    if let Some(reason) = &summary.abort_reason {
        lines.push(format!("  aborted: {reason}"));
    }

    lines
}

/// Renders a status breakdown as `status: count` lines under a total.
#[must_use]
pub fn breakdown_lines(breakdown: &[StatusCount]) -> Vec<String> {
    let total: u64 = breakdown.iter().map(|s| s.count).sum();
    let mut lines = Vec::with_capacity(breakdown.len() + 1);
    lines.push(format!("Total companies: {total}"));
    for entry in breakdown {
        lines.push(format!(
            "  {}: {}",
            entry.status.as_deref().unwrap_or("(none)"),
            entry.count
        ));
    }
    lines
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the company registry loader.
//!
//! [`RowProgress`] renders the ingestion controller's progress callbacks as
//! an `indicatif` bar counting source rows. [`init_logger`] routes `log`
//! output through the same [`MultiProgress`] so status lines print above
//! the bar instead of tearing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use company_registry_ingest_models::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Source rows read so far, shown as a spinner until a row total is known.
///
/// The total for a company extract is usually an estimate that is refined
/// as the file is read, so [`ProgressCallback::set_total`] may be called
/// many times. Each call only moves the bar's end; the position and the
/// status line are kept.
pub struct RowProgress {
    bar: ProgressBar,
    counting_style: ProgressStyle,
    has_total: AtomicBool,
}

impl RowProgress {
    /// Adds a row counter to `multi`, starting with `message` next to a
    /// spinner.
    #[must_use]
    pub fn rows_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message.to_string());
        Arc::new(Self::from_bar(bar))
    }

    fn from_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let counting_style = ProgressStyle::with_template(
            "{spinner:.cyan} {msg}\n  {wide_bar:.cyan/dim} {human_pos}/{human_len} rows \
             {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self {
            bar,
            counting_style,
            has_total: AtomicBool::new(false),
        }
    }
}

impl ProgressCallback for RowProgress {
    fn set_total(&self, total: u64) {
        if self.bar.length() == Some(total) {
            return;
        }
        self.bar.set_length(total);
        if !self.has_total.swap(true, Ordering::Relaxed) {
            self.bar.set_style(self.counting_style.clone());
        }
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that [`RowProgress`] bars must be added
/// to for log lines to interleave cleanly.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice (e.g. from tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refining_the_total_keeps_position_and_message() {
        let progress = RowProgress::from_bar(ProgressBar::hidden());
        progress.set_message("1,000 rows read".to_string());
        progress.set_position(1_000);

        progress.set_total(50_000);
        progress.set_total(48_000);

        assert_eq!(progress.bar.position(), 1_000);
        assert_eq!(progress.bar.length(), Some(48_000));
        assert_eq!(progress.bar.message(), "1,000 rows read");
    }

    #[test]
    fn switches_from_spinner_once() {
        let progress = RowProgress::from_bar(ProgressBar::hidden());
        assert!(!progress.has_total.load(Ordering::Relaxed));

        progress.set_total(10);
        progress.set_total(10);

        assert!(progress.has_total.load(Ordering::Relaxed));
        assert_eq!(progress.bar.length(), Some(10));
    }
}

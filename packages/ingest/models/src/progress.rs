//! Progress reporting seam between the pipeline and whatever renders it.
//!
//! The pipeline only knows about [`ProgressCallback`]. The CLI plugs in an
//! `indicatif` bar; tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running import.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// [`Arc`].
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of source rows (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Sets the number of source rows processed so far.
    fn set_position(&self, pos: u64);

    /// Updates the text shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the import as finished.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

//! Errors raised by an ingestion run.

use company_registry_database::DbError;
use company_registry_ingest_models::IngestSummary;
use company_registry_source::SourceError;

/// Errors that stop an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Invalid configuration, detected before any row is read.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The source file could not be read.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The target store rejected an operation.
    #[error("Write error: {0}")]
    Write(#[from] DbError),

    /// Too many rows failed to decode.
    #[error(
        "Decode failure threshold exceeded: {failures} of {lines} rows failed ({reason})"
    )]
    ThresholdExceeded {
        /// Rows that failed to decode.
        failures: u64,
        /// Rows read so far.
        lines: u64,
        /// Which limit was crossed.
        reason: String,
    },

    /// The operator interrupted the run.
    #[error("Cancelled by operator")]
    Cancelled,

    /// The run stopped after it had started writing. Carries the summary of
    /// everything committed before the failure.
    #[error("Ingestion aborted: {source}")]
    Aborted {
        /// Counters at the time of the abort.
        summary: Box<IngestSummary>,
        /// What stopped the run.
        source: Box<Self>,
    },
}

impl IngestError {
    /// Builds a [`IngestError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the summary attached to an aborted run.
    #[must_use]
    pub fn summary(&self) -> Option<&IngestSummary> {
        match self {
            Self::Aborted { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// Returns the error that caused the run to stop, looking through
    /// [`IngestError::Aborted`].
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

//! Loading [`IngestConfig`] from TOML and the environment.

use std::path::Path;

use company_registry_ingest_models::{ConflictPolicy, IngestConfig, LoadMode};

use crate::IngestError;

/// Environment variable overriding the batch size.
pub const BATCH_SIZE_ENV: &str = "COMPANY_REGISTRY_BATCH_SIZE";

/// Parses an [`IngestConfig`] from TOML text. Missing keys take their
/// defaults; unknown keys are rejected.
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] if the text is not a valid
/// config.
pub fn parse_config(text: &str) -> Result<IngestConfig, IngestError> {
    toml::from_str(text).map_err(|e| IngestError::configuration(format!("invalid config: {e}")))
}

/// Reads and parses a TOML config file.
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] if the file cannot be read or
/// parsed.
pub fn load_config(path: &Path) -> Result<IngestConfig, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        IngestError::configuration(format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = parse_config(&text)?;
    log::info!("Loaded ingestion config from {}", path.display());
    Ok(config)
}

/// Applies the `COMPANY_REGISTRY_BATCH_SIZE` override, if set.
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] if the variable is set but is
/// not a positive integer.
pub fn apply_env_overrides(config: &mut IngestConfig) -> Result<(), IngestError> {
    apply_batch_size_override(config, std::env::var(BATCH_SIZE_ENV).ok().as_deref())
}

fn apply_batch_size_override(
    config: &mut IngestConfig,
    value: Option<&str>,
) -> Result<(), IngestError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let batch_size: usize = value.parse().map_err(|_| {
        IngestError::configuration(format!("{BATCH_SIZE_ENV}={value} is not a valid batch size"))
    })?;
    log::info!("Batch size {batch_size} from {BATCH_SIZE_ENV}");
    config.batch_size = batch_size;
    Ok(())
}

/// Values supplied on the command line. `None` leaves the configured value
/// alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--batch-size`
    pub batch_size: Option<usize>,
    /// `--mode`
    pub mode: Option<LoadMode>,
    /// `--policy`
    pub policy: Option<ConflictPolicy>,
    /// `--max-decode-failures`
    pub max_decode_failures: Option<u64>,
    /// `--max-decode-failure-rate`
    pub max_decode_failure_rate: Option<f64>,
    /// `--continue-on-write-error`
    pub continue_on_write_error: bool,
    /// `--progress-interval`
    pub progress_interval: Option<u64>,
    /// `--expected-total`
    pub expected_total: Option<u64>,
}

impl ConfigOverrides {
    /// Writes every set value into `config`.
    pub fn apply(self, config: &mut IngestConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(max) = self.max_decode_failures {
            config.max_decode_failures = Some(max);
        }
        if let Some(rate) = self.max_decode_failure_rate {
            config.max_decode_failure_rate = Some(rate);
        }
        if self.continue_on_write_error {
            config.continue_on_write_error = true;
        }
        if let Some(interval) = self.progress_interval {
            config.progress_interval = interval;
        }
        if let Some(total) = self.expected_total {
            config.expected_total = Some(total);
        }
    }
}

/// Builds the effective config: the TOML file (or defaults), then the
/// environment, then command-line overrides.
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] if the file cannot be loaded, the
/// environment holds an invalid value, or the result fails [`validate`].
pub fn resolve(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<IngestConfig, IngestError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => IngestConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    overrides.apply(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Checks values that serde cannot express as types.
///
/// # Errors
///
/// Returns [`IngestError::Configuration`] describing the first invalid
/// value.
pub fn validate(config: &IngestConfig) -> Result<(), IngestError> {
    if config.batch_size == 0 {
        return Err(IngestError::configuration("batch size must be at least 1"));
    }
    if config.progress_interval == 0 {
        return Err(IngestError::configuration(
            "progress interval must be at least 1",
        ));
    }
    if let Some(rate) = config.max_decode_failure_rate
        && !(0.0..=1.0).contains(&rate)
    {
        return Err(IngestError::configuration(format!(
            "decode failure rate {rate} must be between 0 and 1"
        )));
    }
    Ok(())
}

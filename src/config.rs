//! Engine configuration
//!
//! Every field has a default so an empty JSON object is a valid config.
//! Unknown keys are rejected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Severity};

/// Environment variable overriding the descriptor worker count
pub const DESCRIPTOR_WORKERS_ENV: &str = "COMPOUND_TABLE_DESCRIPTOR_WORKERS";

/// Upper bound for the descriptor worker pool
pub const MAX_DESCRIPTOR_WORKERS: usize = 64;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "CT_CONFIG_READ",
            ConfigError::Parse(_) => "CT_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "CT_CONFIG_INVALID",
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Table engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Descriptor worker threads; `None` uses the available parallelism
    pub descriptor_workers: Option<usize>,

    /// Distinct text values beyond which a column gets no category list
    pub max_text_categories: usize,

    /// Distinct numeric or date values beyond which a column gets no category list
    pub max_numeric_categories: usize,

    /// Separator of multiple values within one cell. A newline always separates too.
    pub value_separator: String,

    /// Minimum severity written by the logger
    pub log_level: Severity,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            descriptor_workers: None,
            max_text_categories: 65536,
            max_numeric_categories: 10000,
            value_separator: "; ".to_string(),
            log_level: Severity::Info,
        }
    }
}

impl TableConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: TableConfig = serde_json::from_str(&content)?;
        config.validate()?;

        log_event_with_fields(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.descriptor_workers == Some(0) {
            return Err(ConfigError::Invalid {
                field: "descriptor_workers",
                reason: "must be > 0".into(),
            });
        }
        if self.max_text_categories == 0 {
            return Err(ConfigError::Invalid {
                field: "max_text_categories",
                reason: "must be > 0".into(),
            });
        }
        if self.max_numeric_categories == 0 {
            return Err(ConfigError::Invalid {
                field: "max_numeric_categories",
                reason: "must be > 0".into(),
            });
        }
        if self.value_separator.is_empty() {
            return Err(ConfigError::Invalid {
                field: "value_separator",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Number of descriptor workers to spawn
    ///
    /// Explicit config wins, then the environment override, then the
    /// available hardware parallelism.
    pub fn worker_count(&self) -> usize {
        self.descriptor_workers
            .or_else(|| {
                std::env::var(DESCRIPTOR_WORKERS_ENV)
                    .ok()
                    .and_then(|raw| raw.parse::<usize>().ok())
                    .filter(|value| *value > 0)
            })
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|parallelism| parallelism.get())
                    .unwrap_or(4)
            })
            .clamp(1, MAX_DESCRIPTOR_WORKERS)
    }

    /// Builder-style override of the worker count
    pub fn with_descriptor_workers(mut self, workers: usize) -> Self {
        self.descriptor_workers = Some(workers);
        self
    }
}

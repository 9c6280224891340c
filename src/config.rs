//! Edge store and linking configuration
//!
//! Both structs deserialize from YAML and fall back to the defaults of the
//! canonical graph table for any missing field.

use crate::graph::{Area, Score};
use crate::kv::MAX_BATCH_WRITE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Field value out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where and how the edge store reads and writes rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStoreConfig {
    /// Backing table
    pub table_name: String,
    /// Secondary index keyed by the reverse (`to`) attribute
    pub reverse_index: String,
    /// Secondary index keyed by the area attribute
    pub area_index: String,
    /// Operations per batch call, capped at the store limit of 25
    pub max_batch_size: usize,
    /// Page size hint for reads (None = backend default)
    pub page_size: Option<usize>,
}

impl Default for EdgeStoreConfig {
    fn default() -> Self {
        Self {
            table_name: "graph_based_on_gsi_tbl".to_string(),
            reverse_index: "rk-gsi".to_string(),
            area_index: "ak-gsi".to_string(),
            max_batch_size: MAX_BATCH_WRITE,
            page_size: None,
        }
    }
}

impl EdgeStoreConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("table_name", &self.table_name),
            ("reverse_index", &self.reverse_index),
            ("area_index", &self.area_index),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }
        if self.reverse_index == self.area_index {
            return Err(ConfigError::Invalid(
                "reverse_index and area_index must differ".to_string(),
            ));
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_WRITE {
            return Err(ConfigError::Invalid(format!(
                "max_batch_size must be in 1..={}, got {}",
                MAX_BATCH_WRITE, self.max_batch_size
            )));
        }
        if self.page_size == Some(0) {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Chunk size actually used by the batch writer
    pub fn chunk_size(&self) -> usize {
        self.max_batch_size.clamp(1, MAX_BATCH_WRITE)
    }
}

/// Attributes stamped on edges created by the linking use cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPolicy {
    pub area: String,
    pub score: f64,
    pub ttl_secs: u64,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            area: "area".to_string(),
            score: 0.6576564,
            ttl_secs: 15 * 60, // 15 minutes
        }
    }
}

impl LinkPolicy {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn area(&self) -> Area {
        Area::new(self.area.clone())
    }

    pub fn score(&self) -> Score {
        Score::new(self.score)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

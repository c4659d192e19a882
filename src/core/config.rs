//! Optional `govtrail.toml` configuration.
//!
//! Precedence: CLI flag, then config file, then built-in default.

use crate::core::error::GovtrailError;
use crate::core::store::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "govtrail.toml";
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_GOVERNANCE_FIELD: &str = "governance";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrailConfig {
    /// Default session-log directory for producers and the role gate
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Producer family prefix for log file names
    #[serde(default)]
    pub prefix: Option<String>,
    /// Breakdown length in aggregation reports
    #[serde(default)]
    pub top_n: Option<usize>,
    /// Payload field whose presence marks a governance event
    #[serde(default)]
    pub governance_field: Option<String>,
}

impl TrailConfig {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
    }

    pub fn top_n(&self) -> usize {
        self.top_n.unwrap_or(DEFAULT_TOP_N)
    }

    pub fn governance_field(&self) -> &str {
        self.governance_field
            .as_deref()
            .unwrap_or(DEFAULT_GOVERNANCE_FIELD)
    }

    fn validate(self, source: &Path) -> Result<Self, GovtrailError> {
        if let Some(prefix) = &self.prefix {
            let ok = !prefix.is_empty()
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !ok {
                return Err(GovtrailError::Configuration(format!(
                    "{}: invalid prefix '{}'",
                    source.display(),
                    prefix
                )));
            }
        }
        if self.top_n == Some(0) {
            return Err(GovtrailError::Configuration(format!(
                "{}: top_n must be at least 1",
                source.display()
            )));
        }
        Ok(self)
    }
}

pub fn load_config_file(path: &Path) -> Result<TrailConfig, GovtrailError> {
    let content = fs::read_to_string(path).map_err(|e| {
        GovtrailError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    let config: TrailConfig = toml::from_str(&content)
        .map_err(|e| GovtrailError::Configuration(format!("{}: {}", path.display(), e)))?;
    config.validate(path)
}

/// Load the explicit config path, else `govtrail.toml` in `dir` when present.
/// No config file is not an error.
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<TrailConfig, GovtrailError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    let implicit = dir.join(CONFIG_FILE_NAME);
    if implicit.is_file() {
        tracing::debug!(path = %implicit.display(), "loading config");
        return load_config_file(&implicit);
    }
    Ok(TrailConfig::default())
}

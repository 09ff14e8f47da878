//! Run configuration.
//!
//! Everything a run depends on lives in one immutable [`RunConfig`] value. It can be built
//! in code, from command arguments, or loaded from a JSON file holding a saved query.
use crate::{error::Result, filter::FilterTerm};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

/// Column delimiter of projected rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Space,
    Csv,
    Tsv,
}

impl OutputFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            OutputFormat::Space => b' ',
            OutputFormat::Csv => b',',
            OutputFormat::Tsv => b'\t',
        }
    }
}

/// Whether a run projects rows or summarizes values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Projection,
    Summary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Only records of this measurement are considered.
    pub measurement: Option<String>,
    pub format: OutputFormat,
    /// Matching rows to discard before output starts.
    pub skip: u64,
    /// Maximum rows to output; `None` is unlimited.
    pub limit: Option<u64>,
    pub filters: Vec<FilterTerm>,
    /// Columns to project. Empty selects summary mode.
    pub columns: Vec<String>,
}

impl RunConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        debug!(path = ?path, ?config, "Loaded run configuration");
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        if self.columns.is_empty() {
            Mode::Summary
        } else {
            Mode::Projection
        }
    }
}

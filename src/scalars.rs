//! Scalar time series recorded during training and exported as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name written by [`ScalarLog::export`] inside the log directory.
pub const SCALARS_FILE: &str = "all_scalars.json";

/// Tag to `[(step, value)]` series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScalarLog {
    series: BTreeMap<String, Vec<(usize, f64)>>,
}

impl ScalarLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` at `step` to the series `tag`.
    pub fn add(&mut self, tag: &str, step: usize, value: f64) {
        self.series.entry(tag.to_string()).or_default().push((step, value));
    }

    pub fn get(&self, tag: &str) -> Option<&[(usize, f64)]> {
        self.series.get(tag).map(Vec::as_slice)
    }

    /// Last value recorded for `tag`.
    pub fn last(&self, tag: &str) -> Option<f64> {
        self.get(tag).and_then(|series| series.last()).map(|(_, value)| *value)
    }

    /// Write every series to `<log_dir>/all_scalars.json`, creating the directory.
    pub fn export(&self, log_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;
        let path = log_dir.join(SCALARS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Read a previously exported file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }
}

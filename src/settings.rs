//! Run settings
//!
//! Stored as a JSON file; every field has a default so partial files are fine.
//! Command-line flags override whatever the file provides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::clustering::Linkage;
use crate::error::{TaxonomyError, TaxonomyResult};
use crate::similarity::MetricKind;

/// Default file-name patterns for directory inputs
pub const DEFAULT_PATTERN: &str = "*.json,*.jsonl,*.jsonc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Minimum similarity for two label forms to share a cluster
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub metric: MetricKind,
    #[serde(default)]
    pub linkage: Linkage,
    /// Cap on representative examples per cluster
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    /// Comma-separated glob patterns used when the input is a directory
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Cluster themes and categories on separate threads
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_threshold() -> f64 {
    0.8
}

fn default_max_examples() -> usize {
    3
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            metric: MetricKind::default(),
            linkage: Linkage::default(),
            max_examples: default_max_examples(),
            pattern: default_pattern(),
            parallel: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> TaxonomyResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| TaxonomyError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            TaxonomyError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    /// Check ranges before a run starts
    pub fn validate(&self) -> TaxonomyResult<()> {
        if !self.similarity_threshold.is_finite() || !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(TaxonomyError::InvalidConfig(format!(
                "similarity threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.max_examples == 0 {
            return Err(TaxonomyError::InvalidConfig("max_examples must be at least 1".to_string()));
        }
        if self.patterns().is_empty() {
            return Err(TaxonomyError::InvalidConfig("file pattern is empty".to_string()));
        }
        Ok(())
    }

    /// Individual glob patterns from the comma-separated `pattern` field
    pub fn patterns(&self) -> Vec<&str> {
        self.pattern
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }
}

//! Taxonomy document: ordering, serialization and atomic persistence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use crate::aggregate::{taxonomy_order, ClusterSummary, ThemeBreakdown};
use crate::error::{TaxonomyError, TaxonomyResult};

/// Bumped whenever the document layout changes
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyMetadata {
    pub schema_version: u32,
    /// Records read, valid or not
    pub total_labels: usize,
    pub valid_labels: usize,
    pub dropped_labels: usize,
    /// Records replaced by a later record with the same conversation id
    pub duplicate_labels: usize,
    pub similarity_threshold: f64,
    pub similarity_metric: String,
    pub linkage: String,
    pub max_examples: usize,
    pub input_digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub metadata: TaxonomyMetadata,
    pub themes: Vec<ClusterSummary>,
    pub categories: Vec<ClusterSummary>,
    pub breakdown: Vec<ThemeBreakdown>,
}

impl Taxonomy {
    /// Assemble the document, putting every section in its final order.
    pub fn new(
        metadata: TaxonomyMetadata,
        mut themes: Vec<ClusterSummary>,
        mut categories: Vec<ClusterSummary>,
        mut breakdown: Vec<ThemeBreakdown>,
    ) -> Self {
        sort_clusters(&mut themes);
        sort_clusters(&mut categories);
        breakdown.sort_by(|a, b| {
            taxonomy_order((a.frequency, &a.theme, a.unspecified), (b.frequency, &b.theme, b.unspecified))
        });
        Self { metadata, themes, categories, breakdown }
    }

    /// Pretty JSON with a trailing newline
    pub fn to_json(&self) -> TaxonomyResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the document in one step: a temp file in the destination directory
    /// is synced and renamed over `path`. A failure leaves no partial file behind.
    pub fn write_atomic(&self, path: &Path) -> TaxonomyResult<()> {
        let json = self.to_json()?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TaxonomyError::io(dir, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| TaxonomyError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| TaxonomyError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| TaxonomyError::io(path, e.error))?;

        info!(
            path = %path.display(),
            themes = self.themes.len(),
            categories = self.categories.len(),
            "wrote taxonomy"
        );
        Ok(())
    }

    pub fn read(path: &Path) -> TaxonomyResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| TaxonomyError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| TaxonomyError::InvalidInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Most frequent theme > category pairs, the view a chart renders.
    pub fn top_pairs(&self, limit: usize) -> Vec<(&str, &str, usize)> {
        let mut pairs: Vec<(&str, &str, usize)> = self
            .breakdown
            .iter()
            .flat_map(|t| {
                t.categories
                    .iter()
                    .map(move |c| (t.theme.as_str(), c.category.as_str(), c.frequency))
            })
            .collect();
        pairs.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)).then_with(|| a.1.cmp(b.1)));
        pairs.truncate(limit);
        pairs
    }
}

fn sort_clusters(clusters: &mut [ClusterSummary]) {
    clusters.sort_by(|a, b| {
        taxonomy_order(
            (a.frequency, &a.canonical_label, a.unspecified),
            (b.frequency, &b.canonical_label, b.unspecified),
        )
    });
}

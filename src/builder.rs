//! End-to-end taxonomy build: load → cluster → aggregate → serialize.
//!
//! Each stage owns its working set and hands an immutable result to the next.
//! Nothing is written until the whole taxonomy exists in memory.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::aggregate::{summarize_field, theme_breakdown};
use crate::clustering::{cluster_fields, ClusterEngine};
use crate::error::{TaxonomyError, TaxonomyResult};
use crate::loader::{load_labels, LabelSet};
use crate::settings::Settings;
use crate::taxonomy::{Taxonomy, TaxonomyMetadata, SCHEMA_VERSION};

/// Result of a build run, for reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub output: PathBuf,
    pub total_labels: usize,
    pub valid_labels: usize,
    pub dropped_labels: usize,
    pub duplicate_labels: usize,
    pub theme_clusters: usize,
    pub category_clusters: usize,
    pub elapsed_ms: u128,
}

/// Build the taxonomy for an already loaded label set.
pub fn build_taxonomy(set: &LabelSet, settings: &Settings) -> TaxonomyResult<Taxonomy> {
    settings.validate()?;
    if set.labels.is_empty() {
        return Err(TaxonomyError::EmptyInput {
            total: set.stats.total_records,
            dropped: set.stats.dropped,
        });
    }

    let metric = settings.metric.metric();
    let engine = ClusterEngine::new(&*metric, settings.similarity_threshold, settings.linkage);
    let (themes, categories) = cluster_fields(&engine, &set.labels, settings.parallel);

    let theme_summaries = summarize_field(&themes, &set.labels, settings.max_examples);
    let category_summaries = summarize_field(&categories, &set.labels, settings.max_examples);
    let breakdown = theme_breakdown(&themes, &categories);

    let metadata = TaxonomyMetadata {
        schema_version: SCHEMA_VERSION,
        total_labels: set.stats.total_records,
        valid_labels: set.valid(),
        dropped_labels: set.stats.dropped,
        duplicate_labels: set.stats.duplicates,
        similarity_threshold: settings.similarity_threshold,
        similarity_metric: settings.metric.as_str().to_string(),
        linkage: settings.linkage.as_str().to_string(),
        max_examples: settings.max_examples,
        input_digest: set.input_digest.clone(),
    };

    Ok(Taxonomy::new(metadata, theme_summaries, category_summaries, breakdown))
}

/// Load labels from `input`, build the taxonomy and write it to `output`.
pub fn run(input: &Path, output: &Path, settings: &Settings) -> TaxonomyResult<RunSummary> {
    let start = Instant::now();
    settings.validate()?;

    let set = load_labels(input, &settings.patterns())?;
    let taxonomy = build_taxonomy(&set, settings)?;
    taxonomy.write_atomic(output)?;

    let summary = RunSummary {
        output: output.to_path_buf(),
        total_labels: taxonomy.metadata.total_labels,
        valid_labels: taxonomy.metadata.valid_labels,
        dropped_labels: taxonomy.metadata.dropped_labels,
        duplicate_labels: taxonomy.metadata.duplicate_labels,
        theme_clusters: taxonomy.themes.len(),
        category_clusters: taxonomy.categories.len(),
        elapsed_ms: start.elapsed().as_millis(),
    };
    info!(
        themes = summary.theme_clusters,
        categories = summary.category_clusters,
        valid = summary.valid_labels,
        elapsed_ms = summary.elapsed_ms as u64,
        "taxonomy build complete"
    );
    Ok(summary)
}

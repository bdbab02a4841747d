//! Per-cluster reduction: frequency, confidence statistics, examples, use cases.
//!
//! Members are always visited in ascending conversation id order so that sums and
//! first-seen orders do not depend on input order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::clustering::{FieldCluster, FieldClustering};
use crate::models::Label;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ConfidenceStats {
    /// Stats over a non-empty sequence of confidences.
    fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0f64);
        for v in values {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        (count > 0).then(|| ConfidenceStats { min, max, mean: sum / count as f64 })
    }
}

/// A representative label kept for human inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub conversation_id: String,
    pub raw_theme: String,
    pub raw_category: String,
    pub use_cases: Vec<String>,
}

impl Example {
    fn from_label(label: &Label) -> Self {
        Self {
            conversation_id: label.conversation_id.clone(),
            raw_theme: label.theme.clone(),
            raw_category: label.category.clone(),
            use_cases: label.use_cases.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub canonical_label: String,
    pub aliases: Vec<String>,
    pub frequency: usize,
    pub confidence: ConfidenceStats,
    pub examples: Vec<Example>,
    pub use_cases: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unspecified: bool,
}

/// Reduce one cluster. Returns None for a cluster without members, which the
/// clustering engine never produces.
pub fn summarize_cluster(cluster: &FieldCluster, labels: &[Label], max_examples: usize) -> Option<ClusterSummary> {
    let mut members: Vec<&Label> = cluster.members.iter().map(|&i| &labels[i]).collect();
    members.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));

    let confidence = ConfidenceStats::from_values(members.iter().map(|l| l.confidence))?;

    let mut seen = HashSet::new();
    let mut use_cases = Vec::new();
    for label in &members {
        for case in &label.use_cases {
            if seen.insert(case.as_str()) {
                use_cases.push(case.clone());
            }
        }
    }

    // Highest confidence first; equal confidences keep conversation id order
    let mut ranked = members.clone();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let examples = ranked
        .into_iter()
        .take(max_examples)
        .map(Example::from_label)
        .collect();

    Some(ClusterSummary {
        canonical_label: cluster.canonical_label.clone(),
        aliases: cluster.aliases().into_iter().map(str::to_string).collect(),
        frequency: members.len(),
        confidence,
        examples,
        use_cases,
        unspecified: cluster.unspecified,
    })
}

/// Summaries for every cluster of a field, in cluster creation order
pub fn summarize_field(clustering: &FieldClustering, labels: &[Label], max_examples: usize) -> Vec<ClusterSummary> {
    clustering
        .clusters
        .iter()
        .filter_map(|c| summarize_cluster(c, labels, max_examples))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub frequency: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unspecified: bool,
}

/// How one theme cluster's labels spread across category clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeBreakdown {
    pub theme: String,
    pub frequency: usize,
    pub categories: Vec<CategoryShare>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unspecified: bool,
}

/// Cross-tabulate theme clusters against category clusters.
/// Categories within a theme are ordered by frequency desc, label asc.
pub fn theme_breakdown(themes: &FieldClustering, categories: &FieldClustering) -> Vec<ThemeBreakdown> {
    themes
        .clusters
        .iter()
        .filter(|t| !t.members.is_empty())
        .map(|theme| {
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &label_idx in &theme.members {
                *counts.entry(categories.assignment[label_idx]).or_insert(0) += 1;
            }

            let mut shares: Vec<CategoryShare> = counts
                .into_iter()
                .map(|(cat_idx, frequency)| {
                    let cat = &categories.clusters[cat_idx];
                    CategoryShare {
                        category: cat.canonical_label.clone(),
                        frequency,
                        unspecified: cat.unspecified,
                    }
                })
                .collect();
            shares.sort_by(|a, b| {
                taxonomy_order((a.frequency, &a.category, a.unspecified), (b.frequency, &b.category, b.unspecified))
            });

            ThemeBreakdown {
                theme: theme.canonical_label.clone(),
                frequency: theme.members.len(),
                categories: shares,
                unspecified: theme.unspecified,
            }
        })
        .collect()
}

/// Frequency desc, label asc, real content before the unspecified bucket.
pub fn taxonomy_order(a: (usize, &str, bool), b: (usize, &str, bool)) -> std::cmp::Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)).then_with(|| a.2.cmp(&b.2))
}

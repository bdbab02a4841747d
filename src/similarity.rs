//! String similarity for normalized label keys
//!
//! The clustering engine only sees the `SimilarityMetric` trait, so the comparison
//! can be swapped (edit distance, token overlap, exact) without touching the
//! clustering or aggregation code.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::normalize::tokens;

/// Scores two normalized keys on a [0, 1] scale.
///
/// Implementations must return 1.0 for equal keys.
pub trait SimilarityMetric: Send + Sync {
    fn name(&self) -> &'static str;
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Normalized Levenshtein distance: `1 - edits / max_len`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl SimilarityMetric for Levenshtein {
    fn name(&self) -> &'static str {
        "levenshtein"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        strsim::normalized_levenshtein(a, b)
    }
}

/// Jaro-Winkler similarity, favours shared prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl SimilarityMetric for JaroWinkler {
    fn name(&self) -> &'static str {
        "jaro-winkler"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        strsim::jaro_winkler(a, b)
    }
}

/// Jaccard ratio over the token sets of both keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl SimilarityMetric for TokenOverlap {
    fn name(&self) -> &'static str {
        "token-overlap"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let set_a: HashSet<&str> = tokens(a).collect();
        let set_b: HashSet<&str> = tokens(b).collect();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 0.0;
        }
        set_a.intersection(&set_b).count() as f64 / union as f64
    }
}

/// Equal keys score 1.0, everything else 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exact;

impl SimilarityMetric for Exact {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b { 1.0 } else { 0.0 }
    }
}

/// Metric selectable from settings and the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    #[default]
    Levenshtein,
    JaroWinkler,
    TokenOverlap,
    Exact,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Levenshtein => "levenshtein",
            MetricKind::JaroWinkler => "jaro-winkler",
            MetricKind::TokenOverlap => "token-overlap",
            MetricKind::Exact => "exact",
        }
    }

    pub fn metric(&self) -> Box<dyn SimilarityMetric> {
        match self {
            MetricKind::Levenshtein => Box::new(Levenshtein),
            MetricKind::JaroWinkler => Box::new(JaroWinkler),
            MetricKind::TokenOverlap => Box::new(TokenOverlap),
            MetricKind::Exact => Box::new(Exact),
        }
    }
}

/// Find the candidate most similar to `target`.
/// Returns (candidate_index, score) for the best score >= `min_similarity`;
/// ties go to the lowest index so results follow candidate order.
pub fn best_match<'a, I>(
    metric: &dyn SimilarityMetric,
    target: &str,
    candidates: I,
    min_similarity: f64,
) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = metric.similarity(target, candidate);
        if score < min_similarity {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}

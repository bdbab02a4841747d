//! Similarity clustering of theme and category strings
//!
//! Two-phase batch algorithm:
//! 1. Collect every distinct raw form of a field with its occurrence count, sorted by
//!    count descending then raw string in dictionary order. This order depends only on the
//!    input multiset, never on arrival order.
//! 2. Walk the forms in that order and grow clusters. The first form of a cluster is
//!    its canonical label and never changes afterwards.
//!
//! Forms whose normalized keys are equal always share a cluster. Blank forms go to a
//! dedicated unspecified bucket that never merges with real content.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{Field, Label, NormalizedKey};
use crate::similarity::{best_match, SimilarityMetric};

/// Canonical label of the bucket holding blank theme/category strings
pub const UNSPECIFIED_LABEL: &str = "(unspecified)";

/// How a form is compared against an existing cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Compare against each cluster's canonical key only.
    ///
    /// Not monotone in the threshold: a lower threshold can absorb a form into an
    /// earlier cluster, so it never seeds its own, and a later form that only
    /// matched that seed may then start a new cluster. Use `Single` when cluster
    /// counts must never grow as the threshold drops.
    #[default]
    Seed,
    /// Compare against every key in the cluster; bridged clusters merge
    Single,
}

impl Linkage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Seed => "seed",
            Linkage::Single => "single",
        }
    }
}

/// One distinct raw spelling of a field value
#[derive(Debug, Clone, PartialEq)]
pub struct LabelForm {
    pub key: NormalizedKey,
    pub raw: String,
    pub occurrences: usize,
}

/// Near-duplicate forms judged equivalent, plus the labels that carry them
#[derive(Debug, Clone)]
pub struct FieldCluster {
    pub canonical_label: String,
    pub canonical_key: NormalizedKey,
    /// Forms in processing order; the first one is canonical
    pub forms: Vec<LabelForm>,
    /// Indices into the label slice the clustering ran on
    pub members: Vec<usize>,
    pub unspecified: bool,
}

impl FieldCluster {
    fn seeded(form: LabelForm) -> Self {
        Self {
            canonical_label: form.raw.clone(),
            canonical_key: form.key.clone(),
            forms: vec![form],
            members: Vec::new(),
            unspecified: false,
        }
    }

    fn unspecified() -> Self {
        Self {
            canonical_label: UNSPECIFIED_LABEL.to_string(),
            canonical_key: NormalizedKey::default(),
            forms: Vec::new(),
            members: Vec::new(),
            unspecified: true,
        }
    }

    /// Raw spellings other than the canonical one, in processing order
    pub fn aliases(&self) -> Vec<&str> {
        self.forms
            .iter()
            .map(|f| f.raw.as_str())
            .filter(|raw| *raw != self.canonical_label && !raw.trim().is_empty())
            .collect()
    }

    /// Total occurrences over all forms
    pub fn occurrences(&self) -> usize {
        self.forms.iter().map(|f| f.occurrences).sum()
    }
}

/// Clusters for one field and the label → cluster mapping
#[derive(Debug, Clone)]
pub struct FieldClustering {
    pub field: Field,
    /// Clusters in creation order
    pub clusters: Vec<FieldCluster>,
    /// `assignment[label_index]` is the index of that label's cluster
    pub assignment: Vec<usize>,
}

/// Distinct forms of `field`, sorted by occurrences desc then raw string.
pub fn collect_forms(labels: &[Label], field: Field) -> Vec<LabelForm> {
    let mut counts: HashMap<&str, (usize, &NormalizedKey)> = HashMap::new();
    for label in labels {
        let entry = counts.entry(field.raw(label)).or_insert((0, field.key(label)));
        entry.0 += 1;
    }

    let mut forms: Vec<LabelForm> = counts
        .into_iter()
        .map(|(raw, (occurrences, key))| LabelForm {
            key: key.clone(),
            raw: raw.to_string(),
            occurrences,
        })
        .collect();
    forms.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| dictionary_order(&a.raw, &b.raw))
    });
    forms
}

/// Case-insensitive ascending order; on a case-only difference the lower-case
/// spelling comes first. Total over distinct strings.
fn dictionary_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

pub struct ClusterEngine<'a> {
    metric: &'a dyn SimilarityMetric,
    threshold: f64,
    linkage: Linkage,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(metric: &'a dyn SimilarityMetric, threshold: f64, linkage: Linkage) -> Self {
        Self { metric, threshold, linkage }
    }

    /// Cluster the values of one field across all labels.
    pub fn cluster_field(&self, labels: &[Label], field: Field) -> FieldClustering {
        let forms = collect_forms(labels, field);
        let form_count = forms.len();

        let mut clusters = match self.linkage {
            Linkage::Seed => self.seed_clusters(field, forms),
            Linkage::Single => self.single_link_clusters(field, forms),
        };

        let mut by_key: HashMap<&NormalizedKey, usize> = HashMap::new();
        for (idx, cluster) in clusters.iter().enumerate() {
            for form in &cluster.forms {
                by_key.insert(&form.key, idx);
            }
        }

        let mut assignment = Vec::with_capacity(labels.len());
        let mut member_lists: Vec<Vec<usize>> = vec![Vec::new(); clusters.len()];
        for (label_idx, label) in labels.iter().enumerate() {
            // Every key was registered while its form was placed
            let cluster_idx = by_key[field.key(label)];
            assignment.push(cluster_idx);
            member_lists[cluster_idx].push(label_idx);
        }
        for (cluster, members) in clusters.iter_mut().zip(member_lists) {
            cluster.members = members;
        }

        info!(
            field = %field,
            forms = form_count,
            clusters = clusters.len(),
            threshold = self.threshold,
            metric = self.metric.name(),
            linkage = self.linkage.as_str(),
            "clustered field"
        );

        FieldClustering { field, clusters, assignment }
    }

    /// Leader clustering: each form is compared with the canonical key of every
    /// cluster created so far and joins the best one at or above the threshold.
    fn seed_clusters(&self, field: Field, forms: Vec<LabelForm>) -> Vec<FieldCluster> {
        let mut clusters: Vec<FieldCluster> = Vec::new();
        let mut key_to_cluster: HashMap<NormalizedKey, usize> = HashMap::new();
        // (cluster index, canonical key) for clusters holding real content
        let mut seeds: Vec<(usize, NormalizedKey)> = Vec::new();
        let mut unspecified: Option<usize> = None;

        for form in forms {
            let target = if form.key.is_blank() {
                *unspecified.get_or_insert_with(|| {
                    clusters.push(FieldCluster::unspecified());
                    clusters.len() - 1
                })
            } else if let Some(&idx) = key_to_cluster.get(&form.key) {
                idx
            } else {
                let candidates = seeds.iter().map(|(_, key)| key.as_str());
                match best_match(self.metric, form.key.as_str(), candidates, self.threshold) {
                    Some((seed_idx, score)) => {
                        let idx = seeds[seed_idx].0;
                        debug!(
                            field = %field,
                            form = %form.raw,
                            canonical = %clusters[idx].canonical_label,
                            score,
                            "merged form"
                        );
                        idx
                    }
                    None => {
                        clusters.push(FieldCluster::seeded(form.clone()));
                        let idx = clusters.len() - 1;
                        seeds.push((idx, form.key.clone()));
                        key_to_cluster.insert(form.key, idx);
                        continue;
                    }
                }
            };

            key_to_cluster.insert(form.key.clone(), target);
            clusters[target].forms.push(form);
        }
        clusters
    }

    /// Single-linkage clustering: the connected components of the graph linking
    /// keys whose similarity reaches the threshold. Components are ordered by
    /// their first form, which is also their canonical form.
    fn single_link_clusters(&self, field: Field, forms: Vec<LabelForm>) -> Vec<FieldCluster> {
        // Distinct non-blank keys in first-seen processing order
        let mut keys: Vec<&NormalizedKey> = Vec::new();
        let mut key_index: HashMap<&NormalizedKey, usize> = HashMap::new();
        for form in forms.iter().filter(|f| !f.key.is_blank()) {
            key_index.entry(&form.key).or_insert_with(|| {
                keys.push(&form.key);
                keys.len() - 1
            });
        }

        let mut components = DisjointSet::new(keys.len());
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                if components.find(i) == components.find(j) {
                    continue;
                }
                let score = self.metric.similarity(keys[i].as_str(), keys[j].as_str());
                if score >= self.threshold {
                    debug!(field = %field, a = %keys[i], b = %keys[j], score, "linked keys");
                    components.union(i, j);
                }
            }
        }

        let mut clusters: Vec<FieldCluster> = Vec::new();
        let mut root_to_cluster: HashMap<usize, usize> = HashMap::new();
        let mut unspecified: Option<usize> = None;
        for form in &forms {
            let target = if form.key.is_blank() {
                *unspecified.get_or_insert_with(|| {
                    clusters.push(FieldCluster::unspecified());
                    clusters.len() - 1
                })
            } else {
                let root = components.find(key_index[&form.key]);
                match root_to_cluster.get(&root) {
                    Some(&idx) => idx,
                    None => {
                        clusters.push(FieldCluster::seeded(form.clone()));
                        root_to_cluster.insert(root, clusters.len() - 1);
                        continue;
                    }
                }
            };
            clusters[target].forms.push(form.clone());
        }
        clusters
    }
}

/// Union-find over key indices; the smaller index always becomes the root.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Cluster themes and categories. With `parallel` the two fields run on separate
/// rayon tasks; they share no state, so the result is the same either way.
pub fn cluster_fields(engine: &ClusterEngine<'_>, labels: &[Label], parallel: bool) -> (FieldClustering, FieldClustering) {
    if parallel {
        rayon::join(
            || engine.cluster_field(labels, Field::Theme),
            || engine.cluster_field(labels, Field::Category),
        )
    } else {
        (
            engine.cluster_field(labels, Field::Theme),
            engine.cluster_field(labels, Field::Category),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{Exact, Levenshtein, TokenOverlap};

    fn label(id: &str, theme: &str, category: &str) -> Label {
        Label::new(id, theme, category, 0.5, vec![])
    }

    fn canonicals(c: &FieldClustering) -> Vec<&str> {
        c.clusters.iter().map(|c| c.canonical_label.as_str()).collect()
    }

    #[test]
    fn test_collect_forms_order() {
        let labels = vec![
            label("1", "b", "x"),
            label("2", "a", "x"),
            label("3", "c", "x"),
            label("4", "c", "x"),
            label("5", "B", "x"),
        ];
        let forms = collect_forms(&labels, Field::Theme);
        let raws: Vec<&str> = forms.iter().map(|f| f.raw.as_str()).collect();
        assert_eq!(raws, vec!["c", "a", "b", "B"]);
        assert_eq!(forms[0].occurrences, 2);
    }

    #[test]
    fn test_billing_scenario() {
        let labels = vec![
            label("1", "billing issue", "finance"),
            label("2", "Billing Issue", "Finance"),
            label("3", "refund request", "finance"),
        ];
        let engine = ClusterEngine::new(&Levenshtein, 0.8, Linkage::Seed);

        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(themes.clusters.len(), 2);
        let billing = &themes.clusters[themes.assignment[0]];
        assert_eq!(billing.canonical_label, "billing issue");
        assert_eq!(billing.aliases(), vec!["Billing Issue"]);
        assert_eq!(billing.members, vec![0, 1]);
        assert_eq!(themes.assignment[0], themes.assignment[1]);
        assert_ne!(themes.assignment[0], themes.assignment[2]);

        let categories = engine.cluster_field(&labels, Field::Category);
        assert_eq!(categories.clusters.len(), 1);
        assert_eq!(categories.clusters[0].canonical_label, "finance");
        assert_eq!(categories.clusters[0].aliases(), vec!["Finance"]);
        assert_eq!(categories.clusters[0].members.len(), 3);
    }

    #[test]
    fn test_canonical_is_most_frequent_form() {
        let labels = vec![
            label("1", "Refund", "x"),
            label("2", "refund", "x"),
            label("3", "refund", "x"),
        ];
        let engine = ClusterEngine::new(&Exact, 1.0, Linkage::Seed);
        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(canonicals(&themes), vec!["refund"]);
        assert_eq!(themes.clusters[0].aliases(), vec!["Refund"]);
        assert_eq!(themes.clusters[0].occurrences(), 3);
    }

    #[test]
    fn test_canonical_fixed_at_creation() {
        // "billing issues" seeds the cluster with two occurrences; later aliases
        // add up to more but the canonical stays.
        let labels = vec![
            label("1", "billing issues", "x"),
            label("2", "billing issues", "x"),
            label("3", "billing issue", "x"),
            label("4", "Billing issue", "x"),
            label("5", "billing-issue", "x"),
        ];
        let engine = ClusterEngine::new(&Levenshtein, 0.8, Linkage::Seed);
        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(canonicals(&themes), vec!["billing issues"]);
        assert_eq!(themes.clusters[0].members.len(), 5);
    }

    #[test]
    fn test_threshold_one_is_exact_grouping() {
        let labels = vec![
            label("1", "billing issue", "x"),
            label("2", "billing issues", "x"),
            label("3", "Billing  Issue", "x"),
        ];
        let engine = ClusterEngine::new(&Levenshtein, 1.0, Linkage::Seed);
        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(themes.clusters.len(), 2);
        assert_eq!(themes.assignment[0], themes.assignment[2]);
    }

    #[test]
    fn test_identical_keys_cluster_even_when_metric_disagrees() {
        // TokenOverlap at threshold 1.0 still scores equal keys as 1.0; the key
        // lookup keeps them together regardless.
        let labels = vec![label("1", "Late Delivery", "x"), label("2", "late delivery!", "x")];
        let engine = ClusterEngine::new(&TokenOverlap, 1.0, Linkage::Seed);
        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(themes.clusters.len(), 1);
    }

    #[test]
    fn test_blank_strings_form_unspecified_bucket() {
        let labels = vec![
            label("1", "", "x"),
            label("2", "  ", "x"),
            label("3", "??", "x"),
            label("4", "billing", "x"),
        ];
        // Threshold 0 would merge anything that can be compared
        let engine = ClusterEngine::new(&Levenshtein, 0.0, Linkage::Seed);
        let themes = engine.cluster_field(&labels, Field::Theme);
        assert_eq!(themes.clusters.len(), 2);

        let bucket = themes.clusters.iter().find(|c| c.unspecified).unwrap();
        assert_eq!(bucket.canonical_label, UNSPECIFIED_LABEL);
        assert_eq!(bucket.members, vec![0, 1, 2]);
        assert_eq!(bucket.aliases(), vec!["??"]);

        let single = ClusterEngine::new(&Levenshtein, 0.0, Linkage::Single);
        assert_eq!(single.cluster_field(&labels, Field::Theme).clusters.len(), 2);
    }

    #[test]
    fn test_below_threshold_never_merges() {
        let labels = vec![label("1", "billing", "x"), label("2", "shipping", "x")];
        let engine = ClusterEngine::new(&Exact, 0.5, Linkage::Seed);
        assert_eq!(engine.cluster_field(&labels, Field::Theme).clusters.len(), 2);
    }

    #[test]
    fn test_seed_linkage_compares_with_canonical_only() {
        // "abcd" seeds; "abce" is close to it; "abee" is close to "abce" but not
        // to the seed, so seed linkage keeps it apart while single linkage chains.
        let labels = vec![
            label("1", "abcd", "x"),
            label("2", "abcd", "x"),
            label("3", "abcd", "x"),
            label("4", "abce", "x"),
            label("5", "abce", "x"),
            label("6", "abee", "x"),
        ];
        let seed = ClusterEngine::new(&Levenshtein, 0.75, Linkage::Seed);
        assert_eq!(canonicals(&seed.cluster_field(&labels, Field::Theme)), vec!["abcd", "abee"]);

        let single = ClusterEngine::new(&Levenshtein, 0.75, Linkage::Single);
        let themes = single.cluster_field(&labels, Field::Theme);
        assert_eq!(canonicals(&themes), vec!["abcd"]);
        assert_eq!(themes.clusters[0].aliases(), vec!["abce", "abee"]);
    }

    #[test]
    fn test_single_linkage_bridges_existing_clusters() {
        // "aaaa" and "bbbb" are unrelated; "aabb" comes later and is
        // half-similar to both. At 0.5 all three join.
        let labels = vec![
            label("1", "aaaa", "x"),
            label("2", "aaaa", "x"),
            label("3", "bbbb", "x"),
            label("4", "bbbb", "x"),
            label("5", "aabb", "x"),
        ];
        let single = ClusterEngine::new(&Levenshtein, 0.5, Linkage::Single);
        let themes = single.cluster_field(&labels, Field::Theme);
        assert_eq!(canonicals(&themes), vec!["aaaa"]);
        assert_eq!(themes.clusters[0].members.len(), 5);
    }

    /// Fixed scores between named keys; 1.0 on equal keys, 0.1 otherwise.
    struct TableMetric(&'static [(&'static str, &'static str, f64)]);

    impl SimilarityMetric for TableMetric {
        fn name(&self) -> &'static str {
            "table"
        }

        fn similarity(&self, a: &str, b: &str) -> f64 {
            if a == b {
                return 1.0;
            }
            self.0
                .iter()
                .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
                .map_or(0.1, |(_, _, score)| *score)
        }
    }

    #[test]
    fn test_seed_linkage_can_split_when_threshold_drops() {
        // At 0.5 "bravo" joins "alpha" and stops being a seed, so "charlie" and
        // "delta" (close only to "bravo") each start their own cluster.
        let metric = TableMetric(&[("alpha", "bravo", 0.6), ("bravo", "charlie", 0.9), ("bravo", "delta", 0.9)]);
        let mut labels = Vec::new();
        for (theme, count) in [("alpha", 4), ("bravo", 3), ("charlie", 2), ("delta", 1)] {
            for i in 0..count {
                labels.push(label(&format!("{}-{}", theme, i), theme, "x"));
            }
        }

        let count = |threshold: f64, linkage: Linkage| {
            ClusterEngine::new(&metric, threshold, linkage)
                .cluster_field(&labels, Field::Theme)
                .clusters
                .len()
        };
        assert_eq!(count(0.8, Linkage::Seed), 2);
        assert_eq!(count(0.5, Linkage::Seed), 3);
        assert_eq!(count(0.8, Linkage::Single), 2);
        assert_eq!(count(0.5, Linkage::Single), 1);
    }

    #[test]
    fn test_assignment_covers_every_label() {
        let labels = vec![
            label("1", "a", "x"),
            label("2", "b", "y"),
            label("3", "", "x"),
        ];
        let engine = ClusterEngine::new(&Levenshtein, 0.8, Linkage::Seed);
        let (themes, categories) = cluster_fields(&engine, &labels, true);
        assert_eq!(themes.assignment.len(), 3);
        assert_eq!(categories.assignment.len(), 3);
        let total: usize = themes.clusters.iter().map(|c| c.members.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let labels: Vec<Label> = (0..40)
            .map(|i| label(&i.to_string(), &format!("theme {}", i % 7), &format!("cat {}", i % 3)))
            .collect();
        let engine = ClusterEngine::new(&Levenshtein, 0.8, Linkage::Seed);
        let (t1, c1) = cluster_fields(&engine, &labels, true);
        let (t2, c2) = cluster_fields(&engine, &labels, false);
        assert_eq!(t1.assignment, t2.assignment);
        assert_eq!(c1.assignment, c2.assignment);
        assert_eq!(canonicals(&t1), canonicals(&t2));
    }

    #[test]
    fn test_linkage_names() {
        assert_eq!(Linkage::from_str("seed", false), Ok(Linkage::Seed));
        assert_eq!(Linkage::from_str("single", false), Ok(Linkage::Single));
        assert!(Linkage::from_str("complete", false).is_err());
        assert_eq!(Linkage::Single.as_str(), "single");
    }
}

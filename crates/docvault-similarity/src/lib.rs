//! Similarity scoring as a fast pre-filter before LLM classification.
//!
//! The engine scores an item's features against recorded criteria
//! instances with a weighted sum: exact-match features (sender domain,
//! PDF presence, recipient) contribute 0 or 1, token features (subject,
//! body) contribute their Jaccard overlap. A workflow's score is the max
//! over its instances. There is no time decay; old examples count
//! exactly as much as new ones.
//!
//! The `_skip` pseudo-workflow is scored like any other, which is what
//! makes negative training work: an item resembling past skips ranks
//! `_skip` first and the pipeline declines it without spending an LLM
//! call.

use docvault_registry::CriteriaInstance;
use docvault_utils::types::WorkflowName;
use docvault_utils::FeatureSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::HashMap;
use tracing::debug;

/// How far from 1.0 the weight sum may drift before normalization.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Scoring weights per feature. Must sum to 1; [`FeatureWeights::normalized`]
/// rescales on load when they do not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub from_domain: f64,
    pub subject_similarity: f64,
    pub has_pdf: f64,
    pub body_keywords: f64,
    pub to_address: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            from_domain: 0.30,
            subject_similarity: 0.25,
            has_pdf: 0.20,
            body_keywords: 0.15,
            to_address: 0.10,
        }
    }
}

impl FeatureWeights {
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.from_domain
            + self.subject_similarity
            + self.has_pdf
            + self.body_keywords
            + self.to_address
    }

    /// Rescale so the weights sum to 1.0 when they drifted outside the
    /// tolerance. All-zero weights fall back to the defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        let sum = self.sum();
        if sum <= f64::EPSILON {
            return Self::default();
        }
        if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
            return self;
        }
        debug!("normalizing feature weights (sum was {sum:.3})");
        Self {
            from_domain: self.from_domain / sum,
            subject_similarity: self.subject_similarity / sum,
            has_pdf: self.has_pdf / sum,
            body_keywords: self.body_keywords / sum,
            to_address: self.to_address / sum,
        }
    }
}

/// One workflow's position in a ranking.
#[derive(Debug, Clone)]
pub struct WorkflowRanking {
    pub workflow: WorkflowName,
    /// Max score over the workflow's criteria instances, in `[0, 1]`.
    pub score: f64,
    /// Up to three best-matching instances, strongest first.
    pub best_matches: Vec<CriteriaInstance>,
}

/// The weighted-Jaccard scorer.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    weights: FeatureWeights,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(FeatureWeights::default())
    }
}

impl SimilarityEngine {
    /// Create an engine; weights are normalized on the way in.
    #[must_use]
    pub fn new(weights: FeatureWeights) -> Self {
        Self {
            weights: weights.normalized(),
        }
    }

    #[must_use]
    pub fn weights(&self) -> &FeatureWeights {
        &self.weights
    }

    /// Score an item's features against one criteria instance.
    #[must_use]
    pub fn calculate_similarity(&self, features: &FeatureSet, instance: &CriteriaInstance) -> f64 {
        let w = &self.weights;
        let stored = &instance.features;

        let mut total = 0.0;
        total += w.from_domain * eq_score(&features.from_domain, &stored.from_domain);
        total += w.subject_similarity * jaccard(&features.subject_tokens, &stored.subject_tokens);
        total += w.has_pdf * if features.has_pdf == stored.has_pdf { 1.0 } else { 0.0 };
        total += w.body_keywords * jaccard(&features.body_tokens, &stored.body_tokens);
        total += w.to_address
            * if features.to.to_lowercase() == stored.to.to_lowercase() {
                1.0
            } else {
                0.0
            };
        total
    }

    /// Rank workflows by their best-matching instance.
    ///
    /// Groups `criteria` by workflow, takes the max score per group,
    /// keeps the three strongest matching instances for display, and
    /// returns the top `top_n` workflows in descending score order.
    #[must_use]
    pub fn rank_workflows(
        &self,
        features: &FeatureSet,
        criteria: &[CriteriaInstance],
        top_n: usize,
    ) -> Vec<WorkflowRanking> {
        let mut grouped: HashMap<&str, Vec<(f64, &CriteriaInstance)>> = HashMap::new();
        for instance in criteria {
            let score = self.calculate_similarity(features, instance);
            grouped
                .entry(instance.workflow_name.as_str())
                .or_default()
                .push((score, instance));
        }

        let mut rankings: Vec<WorkflowRanking> = grouped
            .into_values()
            .map(|mut scored| {
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                let workflow = scored[0].1.workflow_name.clone();
                WorkflowRanking {
                    workflow,
                    score: scored[0].0,
                    best_matches: scored.iter().take(3).map(|(_, i)| (*i).clone()).collect(),
                }
            })
            .collect();

        rankings.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.workflow.cmp(&b.workflow))
        });
        rankings.truncate(top_n);
        rankings
    }

    /// Human-readable reasons why an item matches an instance.
    #[must_use]
    pub fn explain(&self, features: &FeatureSet, instance: &CriteriaInstance) -> Vec<String> {
        let stored = &instance.features;
        let mut reasons = Vec::new();

        if !features.from_domain.is_empty() && features.from_domain == stored.from_domain {
            reasons.push(format!("same sender domain: {}", features.from_domain));
        }

        let common: Vec<&str> = features
            .subject_tokens
            .intersection(&stored.subject_tokens)
            .map(String::as_str)
            .take(5)
            .collect();
        if !common.is_empty() {
            reasons.push(format!("similar subject words: {}", common.join(", ")));
        }

        if features.has_pdf && stored.has_pdf {
            reasons.push("both have PDF attachments".to_string());
        }

        reasons
    }
}

fn eq_score(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Jaccard similarity of two token sets. Two empty sets are identical
/// (1.0); exactly one empty set shares nothing (0.0).
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

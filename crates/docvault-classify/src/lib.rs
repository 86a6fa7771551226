//! Hybrid classification with confidence-based routing.
//!
//! The similarity engine runs first because it is local and free. Its
//! top score decides whether the LLM advisor is consulted at all:
//!
//! - at or above [`HIGH_CONFIDENCE`]: similarity alone decides;
//! - between [`MEDIUM_CONFIDENCE`] and high: the similarity winner
//!   stands, with the LLM's opinion attached as an assist;
//! - below medium (or with no candidates): the LLM is primary, and the
//!   similarity ranking is the fallback when it fails.
//!
//! Until enough positive training examples exist the gate is disabled
//! and the LLM is primary whenever it is allowed. Above the
//! `skip_llm_threshold` the LLM is never called, whatever band the item
//! landed in.

use docvault_advisor::{Advisor, AdvisorOptions, Decision, WorkflowSummary};
use docvault_registry::CriteriaInstance;
use docvault_similarity::{SimilarityEngine, WorkflowRanking};
use docvault_utils::types::WorkflowName;
use docvault_utils::FeatureSet;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Accept the similarity winner without consulting the LLM.
pub const HIGH_CONFIDENCE: f64 = 0.85;

/// Between this and [`HIGH_CONFIDENCE`] the LLM runs as an assist.
pub const MEDIUM_CONFIDENCE: f64 = 0.50;

/// How many workflows a ranking carries.
const TOP_N: usize = 5;

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMethod {
    Similarity,
    Hybrid,
    Llm,
    SimilarityFallback,
}

impl ClassificationMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Hybrid => "hybrid",
            Self::Llm => "llm",
            Self::SimilarityFallback => "similarity_fallback",
        }
    }
}

/// The classifier's answer for one item.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Workflows ranked best-first. Empty when nothing matches.
    pub rankings: Vec<WorkflowRanking>,
    pub method: ClassificationMethod,
    /// The LLM's opinion, present on the hybrid and llm paths.
    pub llm_suggestion: Option<Decision>,
}

impl Classification {
    /// The top-ranked workflow and its score.
    #[must_use]
    pub fn top(&self) -> Option<(&WorkflowName, f64)> {
        self.rankings.first().map(|r| (&r.workflow, r.score))
    }
}

/// Snapshot of routing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub similarity_only: u64,
    pub llm_only: u64,
    pub llm_assisted: u64,
}

#[derive(Default)]
struct StatCounters {
    similarity_only: AtomicU64,
    llm_only: AtomicU64,
    llm_assisted: AtomicU64,
}

/// Tunable thresholds beyond the fixed confidence bands.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierTuning {
    /// Above this similarity score the LLM is never consulted.
    pub skip_llm_threshold: f64,
    /// Positive examples required before the similarity gate activates.
    pub min_training_examples: usize,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            skip_llm_threshold: 0.98,
            min_training_examples: 10,
        }
    }
}

/// Confidence-gated composition of the similarity engine and the LLM
/// advisor.
pub struct HybridClassifier {
    engine: SimilarityEngine,
    advisor: Option<Box<dyn Advisor>>,
    tuning: ClassifierTuning,
    stats: StatCounters,
}

impl HybridClassifier {
    #[must_use]
    pub fn new(
        engine: SimilarityEngine,
        advisor: Option<Box<dyn Advisor>>,
        tuning: ClassifierTuning,
    ) -> Self {
        Self {
            engine,
            advisor,
            tuning,
            stats: StatCounters::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            similarity_only: self.stats.similarity_only.load(Ordering::Relaxed),
            llm_only: self.stats.llm_only.load(Ordering::Relaxed),
            llm_assisted: self.stats.llm_assisted.load(Ordering::Relaxed),
        }
    }

    /// Classify one item.
    ///
    /// Exactly one stat counter increments per call. Advisor failures
    /// never escape: the assist band degrades to similarity and the
    /// primary band falls back to the similarity ranking.
    #[allow(clippy::too_many_arguments)]
    pub async fn classify(
        &self,
        text: &str,
        meta: &Value,
        features: &FeatureSet,
        workflows: &[WorkflowSummary],
        criteria: &[CriteriaInstance],
        opts: &AdvisorOptions,
    ) -> Classification {
        let rankings = self.engine.rank_workflows(features, criteria, TOP_N);

        let advisor = match (&self.advisor, opts.allow_llm) {
            (Some(advisor), true) => advisor,
            _ => {
                self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                return Classification {
                    rankings,
                    method: ClassificationMethod::Similarity,
                    llm_suggestion: None,
                };
            }
        };

        let trained = criteria.iter().filter(|c| !c.workflow_name.is_skip()).count();
        let gate_active = trained >= self.tuning.min_training_examples;

        if gate_active {
            if let Some(top) = rankings.first() {
                if top.score >= self.tuning.skip_llm_threshold {
                    info!(
                        score = top.score,
                        "similarity above skip-llm threshold, not consulting advisor"
                    );
                    self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                    return Classification {
                        rankings,
                        method: ClassificationMethod::Similarity,
                        llm_suggestion: None,
                    };
                }

                if top.score >= HIGH_CONFIDENCE {
                    info!(score = top.score, "high confidence, using similarity");
                    self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                    return Classification {
                        rankings,
                        method: ClassificationMethod::Similarity,
                        llm_suggestion: None,
                    };
                }

                if top.score >= MEDIUM_CONFIDENCE {
                    info!(score = top.score, "medium confidence, offering LLM assist");
                    return match advisor.classify(text, meta, workflows, opts).await {
                        Ok(decision) => {
                            self.stats.llm_assisted.fetch_add(1, Ordering::Relaxed);
                            Classification {
                                rankings,
                                method: ClassificationMethod::Hybrid,
                                llm_suggestion: Some(decision),
                            }
                        }
                        Err(e) => {
                            warn!("LLM assist failed: {e}");
                            self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                            Classification {
                                rankings,
                                method: ClassificationMethod::Similarity,
                                llm_suggestion: None,
                            }
                        }
                    };
                }
            }
        } else {
            info!(
                trained,
                needed = self.tuning.min_training_examples,
                "below training minimum, similarity gate disabled"
            );
        }

        // Low or no confidence (or an inactive gate): the LLM is primary.
        match advisor.classify(text, meta, workflows, opts).await {
            Ok(decision) => {
                self.stats.llm_only.fetch_add(1, Ordering::Relaxed);
                let rankings = decision_rankings(&decision);
                Classification {
                    rankings,
                    method: ClassificationMethod::Llm,
                    llm_suggestion: Some(decision),
                }
            }
            Err(e) => {
                warn!("LLM classification failed, falling back to similarity: {e}");
                self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                Classification {
                    rankings,
                    method: ClassificationMethod::SimilarityFallback,
                    llm_suggestion: None,
                }
            }
        }
    }

    /// Blocking facade over [`classify`](Self::classify).
    ///
    /// Spins up a short-lived runtime on a worker thread, so it is safe
    /// to call whether or not the caller is already inside one.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_blocking(
        &self,
        text: &str,
        meta: &Value,
        features: &FeatureSet,
        workflows: &[WorkflowSummary],
        criteria: &[CriteriaInstance],
        opts: &AdvisorOptions,
    ) -> Classification {
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime
                        .block_on(self.classify(text, meta, features, workflows, criteria, opts)),
                    Err(e) => {
                        warn!("could not start advisor runtime: {e}");
                        self.stats.similarity_only.fetch_add(1, Ordering::Relaxed);
                        Classification {
                            rankings: self.engine.rank_workflows(features, criteria, TOP_N),
                            method: ClassificationMethod::SimilarityFallback,
                            llm_suggestion: None,
                        }
                    }
                }
            });
            handle.join().expect("classifier worker panicked")
        })
    }
}

/// Whether to accept an LLM decision unattended: yes only when its
/// confidence clears the caller's threshold.
#[must_use]
pub fn trust_llm(decision: &Decision, threshold: f64) -> Option<&str> {
    match decision.label.as_deref() {
        Some(label) if decision.confidence >= threshold => Some(label),
        _ => None,
    }
}

fn decision_rankings(decision: &Decision) -> Vec<WorkflowRanking> {
    let mut rankings = Vec::new();
    if let Some(label) = decision.label.as_deref() {
        if let Ok(workflow) = WorkflowName::new(label) {
            rankings.push(WorkflowRanking {
                workflow,
                score: decision.confidence,
                best_matches: Vec::new(),
            });
        }
    }
    for candidate in &decision.candidates {
        if Some(candidate.label.as_str()) == decision.label.as_deref() {
            continue;
        }
        if let Ok(workflow) = WorkflowName::new(&candidate.label) {
            rankings.push(WorkflowRanking {
                workflow,
                score: candidate.confidence,
                best_matches: Vec::new(),
            });
        }
    }
    rankings
}

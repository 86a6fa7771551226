//! The per-item state machine and the batch driver.

use crate::adapter::SourceAdapter;
use crate::decisions::DecisionLog;
use crate::MAX_CONSECUTIVE_TRANSIENT;
use camino::Utf8PathBuf;
use docvault_advisor::{AdvisorOptions, WorkflowSummary};
use docvault_archive::{ArchiveOutcome, ArchiveWriter};
use docvault_classify::{trust_llm, HybridClassifier};
use docvault_dedup::DedupTracker;
use docvault_extract::{FeatureExtractor, Item};
use docvault_index::{DocumentRow, GlobalIndex};
use docvault_registry::{CriteriaInstance, CriteriaStore, WorkflowRegistry};
use docvault_utils::error::{DocVaultError, ErrorKind};
use docvault_utils::types::{DocumentId, WorkflowName};
use std::time::Duration;
use tracing::{info, warn};

/// What a run does with the items it classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Classify, archive, index, mark processed.
    #[default]
    Normal,
    /// Classify and report only; no writes, no tracker mark.
    DryRun,
    /// Classify and record training data and decisions; no archive.
    TrainOnly,
    /// Archive using previously stored decisions; no classification.
    Replay,
}

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AlreadyProcessed { workflow: String },
    /// Nothing matched and no advisor opinion was usable.
    NoWorkflow,
    /// The best match was the `_skip` negative workflow.
    NegativeMatch,
    BelowConfidence { score: f64 },
    /// Replay found no stored decision for this item.
    NoStoredDecision,
}

impl SkipReason {
    fn describe(&self) -> String {
        match self {
            Self::AlreadyProcessed { workflow } => format!("already processed ({workflow})"),
            Self::NoWorkflow => "no matching workflow".to_string(),
            Self::NegativeMatch => "matched negative training examples".to_string(),
            Self::BelowConfidence { score } => {
                format!("confidence {score:.2} below threshold")
            }
            Self::NoStoredDecision => "no stored decision to replay".to_string(),
        }
    }
}

/// The result of processing one item.
#[derive(Debug, Clone)]
pub enum Outcome {
    Archived {
        document_id: DocumentId,
        workflow: WorkflowName,
        content_path: Utf8PathBuf,
    },
    /// Dry run: the workflow that would have been used.
    WouldArchive { workflow: WorkflowName },
    /// Train-only: decision recorded, nothing archived.
    Trained { workflow: WorkflowName },
    Skipped { reason: SkipReason },
    Failed {
        kind: ErrorKind,
        message: String,
        transient: bool,
    },
}

impl Outcome {
    fn failed(err: &DocVaultError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Batch totals, printed at the end of every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Caller-tunable pipeline behavior.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub mode: RunMode,
    /// Reprocess items the tracker already knows.
    pub force: bool,
    pub allow_llm: bool,
    /// Interactive runs may prompt (cost confirmation); batch runs never
    /// do.
    pub interactive: bool,
    /// Restrict classification to these workflows when non-empty.
    pub workflow_filter: Vec<String>,
    /// Drop classifications scoring below this.
    pub min_confidence: Option<f64>,
    /// Accept the advisor's label unattended at or above this
    /// confidence, and skip below it.
    pub trust_llm: Option<f64>,
    pub max_items: Option<usize>,
    /// Skip the cost-confirmation prompt.
    pub assume_yes: bool,
    /// Upsert the global index right after each archive.
    pub index_immediately: bool,
}

/// Everything one orchestrator instance owns while processing items.
pub struct Pipeline<'a> {
    extractor: FeatureExtractor,
    classifier: &'a HybridClassifier,
    registry: &'a WorkflowRegistry,
    criteria: &'a mut CriteriaStore,
    tracker: &'a DedupTracker,
    writer: &'a ArchiveWriter,
    decisions: &'a mut DecisionLog,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: FeatureExtractor,
        classifier: &'a HybridClassifier,
        registry: &'a WorkflowRegistry,
        criteria: &'a mut CriteriaStore,
        tracker: &'a DedupTracker,
        writer: &'a ArchiveWriter,
        decisions: &'a mut DecisionLog,
        options: PipelineOptions,
    ) -> Self {
        Self {
            extractor,
            classifier,
            registry,
            criteria,
            tracker,
            writer,
            decisions,
            options,
        }
    }

    /// Run one item through the full state machine.
    pub async fn process_item(&mut self, raw: &[u8]) -> Outcome {
        let item = match self.extractor.extract(raw) {
            Ok(item) => item,
            Err(e) => return Outcome::failed(&DocVaultError::from(e)),
        };
        let message_id = item.message_id.clone();

        if !self.options.force {
            match self.tracker.is_processed(raw, some_if_nonempty(&message_id)) {
                Ok(true) => {
                    let workflow = self
                        .tracker
                        .get_info(raw, some_if_nonempty(&message_id))
                        .ok()
                        .flatten()
                        .map_or_else(|| "unknown".to_string(), |r| r.workflow_name);
                    return Outcome::Skipped {
                        reason: SkipReason::AlreadyProcessed { workflow },
                    };
                }
                Ok(false) => {}
                Err(e) => return Outcome::failed(&DocVaultError::from(e)),
            }
        }

        if self.options.mode == RunMode::Replay {
            return self.replay_item(raw, &item).await;
        }

        let (workflow_name, confidence) = match self.classify_item(&item).await {
            Ok(Some(choice)) => choice,
            Ok(None) => {
                return Outcome::Skipped {
                    reason: SkipReason::NoWorkflow,
                }
            }
            Err(outcome) => return outcome,
        };

        if workflow_name.is_skip() {
            if self.options.mode != RunMode::DryRun {
                if let Err(e) = self.criteria.record_skip(&item.message_id, item.features.clone()) {
                    warn!("failed to record skip example: {e}");
                }
            }
            return Outcome::Skipped {
                reason: SkipReason::NegativeMatch,
            };
        }

        let Some(workflow) = self.registry.get(workflow_name.as_str()).cloned() else {
            return Outcome::Failed {
                kind: ErrorKind::WorkflowNotFound,
                message: format!("workflow '{workflow_name}' not found"),
                transient: false,
            };
        };

        match self.options.mode {
            RunMode::DryRun => Outcome::WouldArchive {
                workflow: workflow.name,
            },
            RunMode::TrainOnly => {
                if let Err(e) = self.record_training(raw, &item, &workflow.name, confidence) {
                    return Outcome::failed(&e);
                }
                Outcome::Trained {
                    workflow: workflow.name,
                }
            }
            RunMode::Normal => {
                self.archive_and_finalize(raw, &item, &workflow, confidence, true)
                    .await
            }
            RunMode::Replay => unreachable!("replay handled above"),
        }
    }

    async fn replay_item(&mut self, raw: &[u8], item: &Item) -> Outcome {
        let Some(decision) = self.decisions.get(raw, &item.message_id).cloned() else {
            return Outcome::Skipped {
                reason: SkipReason::NoStoredDecision,
            };
        };
        let Some(workflow) = self.registry.get(decision.workflow.as_str()).cloned() else {
            return Outcome::Failed {
                kind: ErrorKind::WorkflowNotFound,
                message: format!("stored workflow '{}' not found", decision.workflow),
                transient: false,
            };
        };
        // Replay archives without re-training.
        self.archive_and_finalize(raw, item, &workflow, decision.confidence, false)
            .await
    }

    /// Classify and apply the selection policy. `Ok(None)` means no
    /// usable candidate, `Err` carries a terminal outcome.
    async fn classify_item(
        &mut self,
        item: &Item,
    ) -> Result<Option<(WorkflowName, f64)>, Outcome> {
        let mut workflows: Vec<WorkflowSummary> = self
            .registry
            .list()
            .iter()
            .map(|w| WorkflowSummary {
                name: w.name.as_str().to_string(),
                description: w.description.clone(),
            })
            .collect();
        if !self.options.workflow_filter.is_empty() {
            workflows.retain(|w| self.options.workflow_filter.contains(&w.name));
        }

        let advisor_opts = AdvisorOptions {
            allow_llm: self.options.allow_llm,
            interactive: self.options.interactive,
            max_candidates: 5,
            workflow_filter: self.options.workflow_filter.clone(),
        };

        let classification = self
            .classifier
            .classify(
                &classification_text(item),
                &item.origin(),
                &item.features,
                &workflows,
                self.criteria.all(),
                &advisor_opts,
            )
            .await;

        info!(
            method = classification.method.as_str(),
            top = ?classification.top().map(|(w, s)| (w.as_str().to_string(), s)),
            "classified item"
        );

        // Unattended trust in the advisor: accept at or above the
        // threshold, skip below it.
        if let (Some(threshold), Some(decision)) = (
            self.options.trust_llm,
            classification.llm_suggestion.as_ref(),
        ) {
            return match trust_llm(decision, threshold) {
                Some(label) => match WorkflowName::new(label) {
                    Ok(name) => Ok(Some((name, decision.confidence))),
                    Err(_) => Ok(None),
                },
                None => Err(Outcome::Skipped {
                    reason: SkipReason::BelowConfidence {
                        score: decision.confidence,
                    },
                }),
            };
        }

        let Some((workflow, score)) = classification.top() else {
            return Ok(None);
        };
        if let Some(min) = self.options.min_confidence {
            if score < min && !workflow.is_skip() {
                return Err(Outcome::Skipped {
                    reason: SkipReason::BelowConfidence { score },
                });
            }
        }
        Ok(Some((workflow.clone(), score)))
    }

    async fn archive_and_finalize(
        &mut self,
        raw: &[u8],
        item: &Item,
        workflow: &docvault_registry::Workflow,
        confidence: f64,
        record_training: bool,
    ) -> Outcome {
        let archived = match self.writer.archive_item(item, workflow) {
            Ok(outcome) => outcome,
            Err(e) => return Outcome::failed(&DocVaultError::from(e)),
        };

        if self.options.index_immediately {
            if let Err(e) = self.index_document(item, workflow, &archived) {
                // The document is on disk and will be picked up by the
                // next full index run; indexing lag is not a failure.
                warn!("immediate index update failed: {e}");
            }
        }

        // I6: the processed mark must observe archive success, and a
        // failed mark is a failed archive.
        if let Err(e) = self.tracker.mark_processed(
            raw,
            some_if_nonempty(&item.message_id),
            &workflow.name,
        ) {
            return Outcome::failed(&DocVaultError::from(e));
        }

        if record_training {
            if let Err(e) = self.record_training(raw, item, &workflow.name, confidence) {
                warn!("failed to record training feedback: {e}");
            }
        }

        Outcome::Archived {
            document_id: archived.document_id,
            workflow: workflow.name.clone(),
            content_path: archived.content_path,
        }
    }

    fn record_training(
        &mut self,
        raw: &[u8],
        item: &Item,
        workflow: &WorkflowName,
        confidence: f64,
    ) -> Result<(), DocVaultError> {
        self.criteria.add(CriteriaInstance {
            email_id: item.message_id.clone(),
            workflow_name: workflow.clone(),
            timestamp: chrono::Utc::now(),
            features: item.features.clone(),
            user_confirmed: self.options.interactive,
            confidence_score: Some(confidence),
        })?;
        self.decisions
            .record(raw, &item.message_id, workflow.clone(), confidence)?;
        Ok(())
    }

    fn index_document(
        &self,
        item: &Item,
        workflow: &docvault_registry::Workflow,
        archived: &ArchiveOutcome,
    ) -> Result<(), DocVaultError> {
        let base = &self.writer.options().base_path;
        let index = GlobalIndex::open(&GlobalIndex::default_path(base))?;

        let entity_dir = base.join(workflow.handling.archive.entity.as_str());
        let rel_path = archived
            .content_path
            .strip_prefix(&entity_dir)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| archived.content_path.to_string());
        let filename = archived
            .content_path
            .file_name()
            .unwrap_or_default()
            .to_string();
        let date = archived.document_id.created_at().format("%Y-%m-%d").to_string();

        let doc_id = index.upsert_document(&DocumentRow {
            entity: workflow.handling.archive.entity.to_string(),
            date,
            filename: filename.clone(),
            rel_path,
            hash: Some(archived.document_id.content_hash().to_string()),
            size: std::fs::metadata(archived.content_path.as_std_path())
                .map(|m| m.len() as i64)
                .unwrap_or(0),
            doc_type: archived
                .content_path
                .extension()
                .unwrap_or_default()
                .to_string(),
            source: item.source.to_string(),
            workflow: Some(workflow.name.as_str().to_string()),
            category: Some(workflow.doctype.clone()),
            confidence: None,
            origin_json: item.origin().to_string(),
            structured_json: None,
        })?;

        let stem = archived
            .content_path
            .file_stem()
            .unwrap_or_default()
            .replace('-', " ");
        index.upsert_fts(
            doc_id,
            &filename,
            &item.subject,
            &item.from,
            &format!("{} {} {stem} {}", item.subject, item.from, item.body),
        )?;
        Ok(())
    }

    /// Drive a whole adapter through the pipeline.
    ///
    /// Prints one status line per item and a final summary. Transient
    /// failures sleep `2^n` seconds and abort the batch after
    /// [`MAX_CONSECUTIVE_TRANSIENT`] in a row.
    pub async fn run_batch(
        &mut self,
        adapter: &mut dyn SourceAdapter,
    ) -> Result<BatchStats, DocVaultError> {
        let total_hint = adapter.len_hint();
        if !self.maybe_estimate_cost(total_hint) {
            println!("Cancelled by user");
            return Ok(BatchStats::default());
        }

        let mut stats = BatchStats::default();
        let mut consecutive_transient: u32 = 0;
        let mut position = 0usize;

        loop {
            if let Some(max) = self.options.max_items {
                if position >= max {
                    break;
                }
            }
            let item = match adapter.next_item() {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    stats.errors += 1;
                    // A permanently broken adapter cannot make progress.
                    if !e.is_transient() {
                        return Err(e);
                    }
                    if !self.note_transient(true, &mut consecutive_transient).await {
                        warn!("aborting batch after {consecutive_transient} consecutive transient errors");
                        return Err(e);
                    }
                    continue;
                }
            };
            position += 1;

            let outcome = self.process_item(&item.raw_bytes).await;
            self.print_status(position, total_hint, &item.display_name, &outcome);

            match &outcome {
                Outcome::Archived { .. } | Outcome::WouldArchive { .. } | Outcome::Trained { .. } => {
                    stats.processed += 1;
                    consecutive_transient = 0;
                }
                Outcome::Skipped { .. } => {
                    stats.skipped += 1;
                    consecutive_transient = 0;
                }
                Outcome::Failed { transient, .. } => {
                    stats.errors += 1;
                    if !self.note_transient(*transient, &mut consecutive_transient).await {
                        warn!("aborting batch after {consecutive_transient} consecutive transient errors");
                        break;
                    }
                }
            }

            if let Err(e) = adapter.ack(&item.id, &outcome) {
                // Upstream acknowledgement (e.g. a label change) failing
                // is transient and counts like any other transient.
                warn!("ack for {} failed: {e}", item.id);
                stats.errors += 1;
                if !self.note_transient(true, &mut consecutive_transient).await {
                    warn!("aborting batch after {consecutive_transient} consecutive transient errors");
                    break;
                }
            }
        }

        self.print_summary(&stats);
        Ok(stats)
    }

    /// Returns false when the batch should abort.
    async fn note_transient(&self, transient: bool, consecutive: &mut u32) -> bool {
        if !transient {
            return true;
        }
        *consecutive += 1;
        if *consecutive >= MAX_CONSECUTIVE_TRANSIENT {
            return false;
        }
        let delay = Duration::from_secs(2u64.pow(*consecutive));
        warn!(
            "transient failure {consecutive}/{MAX_CONSECUTIVE_TRANSIENT}, backing off {}s",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
        true
    }

    /// Print the LLM cost estimate and, for interactive runs, ask for
    /// confirmation. Returns false when the user declined.
    fn maybe_estimate_cost(&self, total_hint: Option<usize>) -> bool {
        if self.options.mode != RunMode::Normal || !self.options.allow_llm {
            return true;
        }
        let Some(total) = total_hint.filter(|&n| n > 0) else {
            return true;
        };
        // Rough: ~20% of items reach the advisor at ~$0.003 a call.
        let estimated = total as f64 * 0.2 * 0.003;
        println!("Estimated LLM cost: ${estimated:.2} (assumes ~20% need LLM assist)");

        if self.options.interactive && !self.options.assume_yes {
            println!("Continue with processing? [Y/n]");
            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_ok()
                && answer.trim().eq_ignore_ascii_case("n")
            {
                return false;
            }
        }
        true
    }

    fn print_status(
        &self,
        position: usize,
        total: Option<usize>,
        name: &str,
        outcome: &Outcome,
    ) {
        let total = total.map_or_else(|| "?".to_string(), |t| t.to_string());
        let prefix = if self.options.mode == RunMode::DryRun {
            "(dry-run) "
        } else {
            ""
        };
        match outcome {
            Outcome::Archived {
                workflow,
                document_id,
                ..
            } => println!("{prefix}[{position}/{total}] OK {name}: archived as {workflow} ({document_id})"),
            Outcome::WouldArchive { workflow } => {
                println!("{prefix}[{position}/{total}] OK {name}: would archive as {workflow}")
            }
            Outcome::Trained { workflow } => {
                println!("{prefix}[{position}/{total}] TRAIN {name}: recorded as {workflow}")
            }
            Outcome::Skipped { reason } => {
                println!("{prefix}[{position}/{total}] SKIP {name}: {}", reason.describe())
            }
            Outcome::Failed { kind, message, .. } => {
                println!("{prefix}[{position}/{total}] ERROR {name}: {kind}: {message}")
            }
        }
    }

    fn print_summary(&self, stats: &BatchStats) {
        println!("\nSummary:");
        println!("  Processed: {}", stats.processed);
        println!("  Skipped: {}", stats.skipped);
        println!("  Errors: {}", stats.errors);
        match self.options.mode {
            RunMode::DryRun => println!("DRY RUN - no documents were written"),
            RunMode::TrainOnly => {
                println!("TRAIN-ONLY - decisions stored and classifier trained, nothing archived")
            }
            RunMode::Replay => println!("REPLAY - stored decisions executed without re-training"),
            RunMode::Normal => {}
        }
    }
}

fn classification_text(item: &Item) -> String {
    let body: String = item.body.chars().take(1000).collect();
    format!("Subject: {}\n\n{body}", item.subject)
}

fn some_if_nonempty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

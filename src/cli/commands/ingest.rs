//! `docvault ingest`: stdin, files, and gmail sources.

use super::load_config;
use crate::adapters::{FilesAdapter, StdinAdapter};
use crate::cli::args::{IngestCommands, RunFlags};
use crate::cli::run::config_error;
use chrono::NaiveDate;
use docvault_advisor::advisor_from_env;
use docvault_archive::{ArchiveOptions, ArchiveWriter, MinimalPdfRenderer};
use docvault_classify::{ClassifierTuning, HybridClassifier};
use docvault_config::Config;
use docvault_dedup::DedupTracker;
use docvault_extract::FeatureExtractor;
use docvault_pipeline::{DecisionLog, Pipeline, PipelineOptions, RunMode, SourceAdapter};
use docvault_registry::{CriteriaStore, WorkflowRegistry};
use docvault_similarity::SimilarityEngine;
use docvault_utils::error::{DocVaultError, RegistryError};
use tracing::warn;

pub fn execute(cmd: IngestCommands) -> Result<(), DocVaultError> {
    match cmd {
        IngestCommands::Stdin { run } => {
            let adapter = StdinAdapter::from_stdin()?;
            run_ingest(adapter, &run, None, true)
        }
        IngestCommands::Files {
            dir,
            run,
            after,
            before,
            max,
        } => {
            let after = parse_date(after.as_deref())?;
            let before = parse_date(before.as_deref())?;
            let adapter = FilesAdapter::discover(&dir, after, before)?;
            println!(
                "Found {} message(s) to process",
                adapter.len_hint().unwrap_or(0)
            );
            run_ingest(adapter, &run, max, false)
        }
        IngestCommands::Gmail { .. } => Err(config_error(
            "the Gmail connector runs as an external client and none is configured; \
             export messages locally and use `docvault ingest files` in the meantime",
        )),
    }
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, DocVaultError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| config_error(format!("invalid date '{s}', expected YYYY-MM-DD")))
    })
    .transpose()
}

fn run_ingest(
    mut adapter: impl SourceAdapter,
    flags: &RunFlags,
    max_items: Option<usize>,
    interactive: bool,
) -> Result<(), DocVaultError> {
    let (home, config) = load_config()?;

    let registry = WorkflowRegistry::load(&Config::workflows_file(&home))?;
    for name in &flags.workflows {
        if registry.get(name).is_none() {
            return Err(RegistryError::NotFound { name: name.clone() }.into());
        }
    }

    let mut criteria = CriteriaStore::load(&Config::criteria_file(&home))?;
    let state_dir = Config::state_dir(&home);
    std::fs::create_dir_all(&state_dir)?;
    let tracker = DedupTracker::open(&DedupTracker::default_path(&state_dir))?;
    let mut decisions = DecisionLog::load(&DecisionLog::default_path(&state_dir))?;

    let writer = ArchiveWriter::new(
        ArchiveOptions {
            base_path: config.archive.resolved_base_path(),
            save_originals: config.archive.save_originals,
            originals_prefix_date: config.archive.originals_prefix_date,
            convert_attachments: config.archive.convert_attachments,
            enable_manifest: true,
        },
        Box::new(MinimalPdfRenderer),
    );

    let advisor = if config.llm.enabled {
        match advisor_from_env(&config.llm.model_alias) {
            Ok(advisor) => Some(advisor),
            Err(e) => {
                warn!("LLM advisor unavailable: {e}");
                None
            }
        }
    } else {
        None
    };
    let allow_llm = advisor.is_some();

    let classifier = HybridClassifier::new(
        SimilarityEngine::new(config.feature_weights),
        advisor,
        ClassifierTuning {
            skip_llm_threshold: config.similarity.skip_llm_threshold,
            min_training_examples: config.similarity.min_training_examples,
        },
    );

    let mode = if flags.dry_run {
        RunMode::DryRun
    } else if flags.train_only {
        RunMode::TrainOnly
    } else if flags.replay {
        RunMode::Replay
    } else {
        RunMode::Normal
    };

    // Confidence floor precedence: explicit flag, then the focused
    // training default, then the worth-archiving gate, then the
    // similarity relevance threshold.
    let min_confidence = flags
        .min_confidence
        .or_else(|| (!flags.workflows.is_empty()).then_some(0.45))
        .or_else(|| {
            config
                .classifier
                .gate_enabled
                .then_some(config.classifier.gate_min_confidence)
        })
        .or(Some(config.similarity.min_threshold));

    let options = PipelineOptions {
        mode,
        force: flags.force,
        allow_llm,
        interactive,
        workflow_filter: flags.workflows.clone(),
        min_confidence,
        trust_llm: flags.trust_llm,
        max_items,
        assume_yes: flags.yes,
        index_immediately: true,
    };

    let mut pipeline = Pipeline::new(
        FeatureExtractor::with_max_size_mb(config.security.max_email_size_mb),
        &classifier,
        &registry,
        &mut criteria,
        &tracker,
        &writer,
        &mut decisions,
        options,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DocVaultError::Io)?;
    runtime.block_on(pipeline.run_batch(&mut adapter))?;
    Ok(())
}

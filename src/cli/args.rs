//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// docvault - personal document archival pipeline
#[derive(Parser)]
#[command(name = "docvault")]
#[command(about = "Ingest, classify, and archive documents into a content-addressed repository")]
#[command(long_about = r#"
docvault ingests items from heterogeneous sources (mail, Slack exports,
local document drops), classifies each against your workflows, and
writes the result into a content-addressed archive with side-car
metadata and derived search indexes.

EXAMPLES:
  # First-time setup: config plus seed workflows
  docvault init

  # Classify and archive one message from stdin
  cat message.eml | docvault ingest stdin

  # Process a directory of .eml files (or a Maildir)
  docvault ingest files ~/mail/inbox --max 50

  # Preview what a batch would do
  docvault ingest files ~/mail/inbox --dry-run

  # Rebuild the global index and search it
  docvault index
  docvault search "invoice acme" --entity acme

  # Derive accounting exports from the archive
  docvault export expenses out/expenses.csv
  docvault export xero --entity tsm out/xero-bills.csv

CONFIGURATION:
  Configuration lives in $DOCVAULT_HOME/config.toml (default
  ~/.docvault). Invalid config files are backed up aside and defaults
  restored. The LLM advisor reads ANTHROPIC_API_KEY from the
  environment.

EXIT CODES:
  0 success, 1 input/parse error, 2 workflow execution error,
  3 unexpected error, 4 configuration error, 5 not found
"#)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the configuration and seed default workflows
    Init {
        /// Recreate config and workflows even if they exist
        #[arg(long)]
        reset: bool,
        /// Entity used for the seeded workflow templates
        #[arg(long, default_value = "personal")]
        entity: String,
    },

    /// Ingest items from a source
    #[command(subcommand)]
    Ingest(IngestCommands),

    /// (Re)build the global metadata and full-text indexes
    Index {
        /// Archive base path (defaults to the configured base)
        #[arg(long)]
        base: Option<PathBuf>,
    },

    /// Search archived documents
    Search {
        /// Full-text query; omit to list newest documents
        query: Option<String>,
        #[arg(long)]
        entity: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Derive CSV exports from archive side-cars
    #[command(subcommand)]
    Export(ExportCommands),

    /// Manage workflows
    #[command(subcommand)]
    Workflows(WorkflowCommands),
}

#[derive(Subcommand)]
pub enum IngestCommands {
    /// Read one message from stdin and classify it
    Stdin {
        #[command(flatten)]
        run: RunFlags,
    },

    /// Process a directory of .eml files or a Maildir
    Files {
        /// Directory to scan
        dir: PathBuf,
        #[command(flatten)]
        run: RunFlags,
        /// Only messages on or after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,
        /// Only messages on or before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,
        /// Process at most this many messages
        #[arg(long)]
        max: Option<usize>,
    },

    /// Process messages from a Gmail-style mailbox
    Gmail {
        /// Search query (e.g. label:INBOX)
        #[arg(long, default_value = "")]
        query: String,
        /// Only process messages carrying this label
        #[arg(long)]
        label: Option<String>,
        /// Label added after successful processing
        #[arg(long, default_value = "docvault/processed")]
        processed_label: String,
        /// Maximum messages per run
        #[arg(long, default_value_t = 20)]
        max: usize,
        /// Remove processed messages from the inbox
        #[arg(long)]
        remove_from_inbox: bool,
        #[command(flatten)]
        run: RunFlags,
    },
}

/// Flags shared by the ingest subcommands.
#[derive(Args, Clone, Default)]
pub struct RunFlags {
    /// Preview without writing anything
    #[arg(long, conflicts_with_all = ["train_only", "replay"])]
    pub dry_run: bool,

    /// Classify and store decisions without archiving
    #[arg(long, conflicts_with = "replay")]
    pub train_only: bool,

    /// Archive using previously stored decisions
    #[arg(long, conflicts_with = "force")]
    pub replay: bool,

    /// Reprocess items the tracker already knows
    #[arg(long)]
    pub force: bool,

    /// Only classify against these workflows (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub workflows: Vec<String>,

    /// Skip classifications below this confidence
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Accept the advisor's label unattended at or above this
    /// confidence; skip below it
    #[arg(long)]
    pub trust_llm: Option<f64>,

    /// Answer yes to confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Expense rows from side-cars carrying accounting data
    Expenses {
        /// Output CSV path
        output: PathBuf,
        #[arg(long)]
        entity: Option<String>,
    },
    /// Xero-compatible bills CSV
    Xero {
        /// Output CSV path
        output: PathBuf,
        #[arg(long)]
        entity: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// List configured workflows
    List,
    /// Add a workflow
    Add {
        /// Workflow name (conventionally entity-doctype)
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        entity: String,
        #[arg(long)]
        doctype: String,
        /// Mark archived documents for semantic indexing
        #[arg(long)]
        index_llmemory: bool,
    },
    /// Delete a workflow (refused while training data references it)
    Delete {
        name: String,
    },
}

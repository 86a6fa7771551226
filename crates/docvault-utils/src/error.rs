//! Error taxonomy for the docvault workspace.
//!
//! Every subsystem has its own `thiserror` enum here, and
//! [`DocVaultError`] rolls them up for the CLI. Two classifications
//! drive batch behavior:
//!
//! - [`ErrorKind`] names the failure for logs and summaries.
//! - [`DocVaultError::is_transient`] decides whether the pipeline's
//!   consecutive-error backoff applies or the item is skipped for good.
//!
//! Library code returns these errors and never calls
//! `std::process::exit`; the CLI maps them to exit codes at the edge.

use crate::exit_codes::ExitCode;
use std::io;
use thiserror::Error;

/// The failure kinds the specification names. Used for per-item status
/// lines and batch summaries, not for matching in code (match on the
/// typed errors instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputParse,
    InputTooLarge,
    SchemaValidation,
    PathSecurity,
    Collision,
    Io,
    LockTimeout,
    DataIntegrity,
    WorkflowNotFound,
    WorkflowConfig,
    Advisor,
    Renderer,
    Transient,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputParse => "input-parse",
            Self::InputTooLarge => "input-too-large",
            Self::SchemaValidation => "schema-validation",
            Self::PathSecurity => "path-security",
            Self::Collision => "collision",
            Self::Io => "io",
            Self::LockTimeout => "lock-timeout",
            Self::DataIntegrity => "data-integrity",
            Self::WorkflowNotFound => "workflow-not-found",
            Self::WorkflowConfig => "workflow-config",
            Self::Advisor => "advisor",
            Self::Renderer => "renderer",
            Self::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic store failures (C1).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("temp file collision at {path}: name already held by a concurrent writer")]
    Collision { path: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Naming and collision-policy failures (C2).
#[derive(Debug, Error)]
pub enum NamingError {
    #[error("unable to resolve filename collision for '{base}' after 999 suffixes")]
    CollisionExhausted { base: String },
}

/// Sidecar schema violations (C3).
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("invalid sidecar field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("sidecar json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dedup tracker failures (C4). The sqlite error is carried as text so
/// this crate does not link the database driver.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("dedup database: {0}")]
    Database(String),
}

/// Advisory file-lock failures.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not acquire lock on {path} within {timeout_secs}s")]
    Timeout { path: String, timeout_secs: u64 },

    #[error("lock io error on {path}: {source}")]
    Io { path: String, source: io::Error },
}

/// Workflow registry and criteria store failures (C5).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("workflow '{name}' not found")]
    NotFound { name: String },

    #[error("too many workflows: {count} (max {max})")]
    TooManyWorkflows { count: usize, max: usize },

    #[error("workflow '{name}' is referenced by {references} criteria instance(s)")]
    StillReferenced { name: String, references: usize },

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("registry data: {0}")]
    Data(String),
}

/// Feature extraction failures (C6).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("item too large: {size_mb:.1}MB (max {max_mb}MB)")]
    ItemTooLarge { size_mb: f64, max_mb: u64 },

    #[error("failed to parse message: {0}")]
    Parse(String),
}

/// LLM advisor failures (C8).
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor misconfigured: {0}")]
    Misconfiguration(String),

    #[error("advisor disabled")]
    Disabled,

    #[error("advisor http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("advisor transport: {0}")]
    Transport(String),

    #[error("advisor returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl AdvisorError {
    /// Network-ish advisor failures count against the batch transient
    /// budget; misconfiguration and bad responses do not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Misconfiguration(_) | Self::Disabled | Self::InvalidResponse(_) => false,
        }
    }
}

/// PDF renderer failures.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no rendering engine available: {0}")]
    MissingEngine(String),

    #[error("render input too large: {bytes} bytes (max {max})")]
    InputTooLarge { bytes: usize, max: usize },

    #[error("render timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("render failed: {0}")]
    Failed(String),
}

/// Archive writer failures (C10).
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Schema(#[from] SidecarError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("archive integrity: {reason}")]
    DataIntegrity { reason: String },

    #[error("refusing path outside the archive: {path}")]
    PathSecurity { path: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Global index failures (C11).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index database: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Export failures (C12).
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("missing configuration: {0}")]
    Missing(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Library-level rollup used at the CLI boundary.
#[derive(Debug, Error)]
pub enum DocVaultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Sidecar(#[from] SidecarError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Advisor(#[from] AdvisorError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl DocVaultError {
    /// Classify the failure for status lines and summaries.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(StoreError::Collision { .. }) => ErrorKind::Collision,
            Self::Store(StoreError::Io(_)) | Self::Io(_) => ErrorKind::Io,
            Self::Naming(_) => ErrorKind::Io,
            Self::Sidecar(_) => ErrorKind::SchemaValidation,
            Self::Dedup(_) => ErrorKind::Io,
            Self::Lock(_) => ErrorKind::LockTimeout,
            Self::Registry(RegistryError::NotFound { .. }) => ErrorKind::WorkflowNotFound,
            Self::Registry(_) => ErrorKind::WorkflowConfig,
            Self::Extract(ExtractError::ItemTooLarge { .. }) => ErrorKind::InputTooLarge,
            Self::Extract(_) => ErrorKind::InputParse,
            Self::Advisor(_) => ErrorKind::Advisor,
            Self::Renderer(_) => ErrorKind::Renderer,
            Self::Archive(ArchiveError::Schema(_)) => ErrorKind::SchemaValidation,
            Self::Archive(ArchiveError::DataIntegrity { .. }) => ErrorKind::DataIntegrity,
            Self::Archive(ArchiveError::PathSecurity { .. }) => ErrorKind::PathSecurity,
            Self::Archive(ArchiveError::Lock(_)) => ErrorKind::LockTimeout,
            Self::Archive(_) => ErrorKind::Io,
            Self::Index(_) | Self::Export(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::WorkflowConfig,
        }
    }

    /// Whether the batch driver should apply exponential backoff and
    /// count this failure against the consecutive-transient limit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Advisor(e) => e.is_transient(),
            Self::Renderer(RendererError::Timeout { .. }) => true,
            Self::Lock(_) | Self::Archive(ArchiveError::Lock(_)) => true,
            Self::Store(StoreError::Io(_)) | Self::Io(_) => true,
            Self::Archive(ArchiveError::Io(_)) | Self::Archive(ArchiveError::Store(_)) => true,
            Self::Dedup(_) | Self::Index(_) => true,
            _ => false,
        }
    }

    /// Map to the CLI exit-code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::InputParse | ErrorKind::InputTooLarge | ErrorKind::SchemaValidation => {
                ExitCode::INPUT
            }
            ErrorKind::WorkflowNotFound => ExitCode::NOT_FOUND,
            ErrorKind::WorkflowConfig => ExitCode::CONFIG,
            ErrorKind::Collision
            | ErrorKind::Io
            | ErrorKind::LockTimeout
            | ErrorKind::DataIntegrity
            | ErrorKind::PathSecurity
            | ErrorKind::Advisor
            | ErrorKind::Renderer
            | ErrorKind::Transient => ExitCode::WORKFLOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_maps_to_collision_kind() {
        let err = DocVaultError::from(StoreError::Collision {
            path: "/tmp/x".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Collision);
    }

    #[test]
    fn too_large_is_permanent() {
        let err = DocVaultError::from(ExtractError::ItemTooLarge {
            size_mb: 30.0,
            max_mb: 25,
        });
        assert_eq!(err.kind(), ErrorKind::InputTooLarge);
        assert!(!err.is_transient());
        assert_eq!(err.to_exit_code(), ExitCode::INPUT);
    }

    #[test]
    fn lock_timeout_is_transient() {
        let err = DocVaultError::from(LockError::Timeout {
            path: "x".into(),
            timeout_secs: 10,
        });
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
    }

    #[test]
    fn advisor_transience_follows_status() {
        assert!(AdvisorError::Http {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(AdvisorError::Http {
            status: 429,
            message: "rate limit".into()
        }
        .is_transient());
        assert!(!AdvisorError::Http {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!AdvisorError::InvalidResponse("garbage".into()).is_transient());
        assert!(AdvisorError::Transport("connection reset".into()).is_transient());
    }

    #[test]
    fn workflow_not_found_exits_5() {
        let err = DocVaultError::from(RegistryError::NotFound {
            name: "acme-invoice".into(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::NOT_FOUND);
    }

    #[test]
    fn schema_violation_is_permanent_input_error() {
        let err = DocVaultError::from(SidecarError::Invalid {
            field: "entity",
            reason: "must be lowercase".into(),
        });
        assert!(!err.is_transient());
        assert_eq!(err.to_exit_code(), ExitCode::INPUT);
    }
}

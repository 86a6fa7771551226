//! Configuration for docvault.
//!
//! One TOML document under the docvault home directory (the
//! `DOCVAULT_HOME` environment variable, defaulting to `~/.docvault`).
//! Loading validates every section; a file that cannot be parsed or
//! validated is renamed aside with a timestamped `.invalid_` suffix and
//! defaults are restored, so a broken edit never bricks the tool.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use docvault_similarity::FeatureWeights;
use docvault_utils::error::ConfigError;
use docvault_utils::write_atomic;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Valid model aliases for the LLM advisor.
pub const MODEL_ALIASES: [&str; 3] = ["fast", "balanced", "deep"];

/// Similarity gate thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Below this, an item is not relevant to any workflow.
    pub min_threshold: f64,
    /// Above this, the similarity winner is accepted without an LLM call.
    pub skip_llm_threshold: f64,
    /// The gate only activates after this many positive examples.
    pub min_training_examples: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            min_threshold: 0.5,
            skip_llm_threshold: 0.98,
            min_training_examples: 10,
        }
    }
}

/// Worth-archiving gate in front of classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub gate_enabled: bool,
    pub gate_min_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            gate_enabled: false,
            gate_min_confidence: 0.7,
        }
    }
}

/// Archive repository settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub base_path: String,
    /// Repository layout version; only `v2` (docs/ + nested streams) is
    /// supported and older values are coerced with a warning.
    pub layout: String,
    pub save_originals: bool,
    pub originals_prefix_date: bool,
    pub convert_attachments: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_path: "~/Archive".to_string(),
            layout: "v2".to_string(),
            save_originals: false,
            originals_prefix_date: false,
            convert_attachments: false,
        }
    }
}

impl ArchiveConfig {
    /// The archive base with `~` expanded.
    #[must_use]
    pub fn resolved_base_path(&self) -> Utf8PathBuf {
        expand_home(&self.base_path)
    }
}

/// LLM advisor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// One of `fast`, `balanced`, `deep`.
    pub model_alias: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_alias: "balanced".to_string(),
        }
    }
}

/// Input hardening bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_email_size_mb: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_email_size_mb: 25,
        }
    }
}

/// Storage limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Soft milestone for criteria growth warnings; instances are never
    /// deleted.
    pub max_criteria_instances_soft: usize,
    pub max_workflows: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_criteria_instances_soft: 50_000,
            max_workflows: 100,
        }
    }
}

/// The complete configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feature_weights: FeatureWeights,
    pub similarity: SimilarityConfig,
    pub classifier: ClassifierConfig,
    pub archive: ArchiveConfig,
    pub llm: LlmConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load from the default home, creating the file with defaults when
    /// absent.
    pub fn discover() -> Result<Self, ConfigError> {
        Self::load_from_home(&home_dir())
    }

    /// Load from an explicit home directory.
    pub fn load_from_home(home: &Utf8Path) -> Result<Self, ConfigError> {
        let path = home.join("config.toml");
        if !path.exists() {
            let config = Self::default();
            config.save(&path)?;
            return Ok(config);
        }

        let text = std::fs::read_to_string(&path)?;
        match toml::from_str::<Self>(&text) {
            Ok(mut config) => {
                config.validate_and_coerce();
                Ok(config)
            }
            Err(e) => {
                let backup = rename_aside(&path)?;
                warn!(
                    "invalid config at {path} ({e}); backed up to {backup} and restored defaults"
                );
                let config = Self::default();
                config.save(&path)?;
                Ok(config)
            }
        }
    }

    /// Persist this configuration.
    pub fn save(&self, path: &Utf8Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        write_atomic(path, text.as_bytes()).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    }

    /// Fix up values that are out of range, logging each coercion.
    /// Loading never fails on a parseable file; it heals it.
    pub fn validate_and_coerce(&mut self) {
        self.feature_weights = self.feature_weights.normalized();

        if !MODEL_ALIASES.contains(&self.llm.model_alias.as_str()) {
            warn!(
                "invalid llm model alias '{}', defaulting to 'balanced'",
                self.llm.model_alias
            );
            self.llm.model_alias = "balanced".to_string();
        }

        if self.archive.layout != "v2" {
            warn!(
                "archive layout '{}' is not supported, switching to 'v2'",
                self.archive.layout
            );
            self.archive.layout = "v2".to_string();
        }

        for (name, value) in [
            ("similarity.min_threshold", &mut self.similarity.min_threshold),
            (
                "similarity.skip_llm_threshold",
                &mut self.similarity.skip_llm_threshold,
            ),
            (
                "classifier.gate_min_confidence",
                &mut self.classifier.gate_min_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(value) {
                warn!("{name} {value} out of [0, 1], clamping");
                *value = value.clamp(0.0, 1.0);
            }
        }

        if self.security.max_email_size_mb == 0 {
            warn!("security.max_email_size_mb must be positive, restoring default");
            self.security.max_email_size_mb = SecurityConfig::default().max_email_size_mb;
        }
    }

    /// Path of the workflow registry file.
    #[must_use]
    pub fn workflows_file(home: &Utf8Path) -> Utf8PathBuf {
        home.join("workflows.json")
    }

    /// Path of the criteria store file.
    #[must_use]
    pub fn criteria_file(home: &Utf8Path) -> Utf8PathBuf {
        home.join("criteria_instances.json")
    }

    /// State directory (dedup tracker, replay decisions).
    #[must_use]
    pub fn state_dir(home: &Utf8Path) -> Utf8PathBuf {
        home.join("state")
    }
}

/// The docvault home: `DOCVAULT_HOME` or `~/.docvault`.
#[must_use]
pub fn home_dir() -> Utf8PathBuf {
    if let Ok(home) = std::env::var("DOCVAULT_HOME") {
        return Utf8PathBuf::from(home);
    }
    expand_home("~/.docvault")
}

fn expand_home(path: &str) -> Utf8PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(user_home) = std::env::var("HOME") {
            return Utf8PathBuf::from(user_home).join(rest);
        }
    }
    Utf8PathBuf::from(path)
}

fn rename_aside(path: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let ts = Local::now().format("%Y%m%d%H%M%S");
    let backup = path.with_file_name(format!(
        "{}.invalid_{ts}",
        path.file_name().unwrap_or("config.toml")
    ));
    std::fs::rename(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn home(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn missing_file_creates_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_home(&home(&dir)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.toml").exists());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.archive.save_originals = true;
        config.llm.model_alias = "deep".to_string();
        config.save(&home(&dir).join("config.toml")).unwrap();

        let loaded = Config::load_from_home(&home(&dir)).unwrap();
        assert!(loaded.archive.save_originals);
        assert_eq!(loaded.llm.model_alias, "deep");
    }

    #[test]
    fn unparseable_file_is_backed_up_and_defaults_restored() {
        let dir = TempDir::new().unwrap();
        let path = home(&dir).join("config.toml");
        std::fs::write(&path, "this is { not toml").unwrap();

        let config = Config::load_from_home(&home(&dir)).unwrap();
        assert_eq!(config, Config::default());

        let backups: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".invalid_"))
            .collect();
        assert_eq!(backups.len(), 1);

        // The restored file parses.
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(toml::from_str::<Config>(&text).is_ok());
    }

    #[test]
    fn bad_values_are_coerced() {
        let mut config = Config {
            llm: LlmConfig {
                enabled: true,
                model_alias: "gpt-x".to_string(),
            },
            archive: ArchiveConfig {
                layout: "v1".to_string(),
                ..Default::default()
            },
            similarity: SimilarityConfig {
                min_threshold: 3.0,
                ..Default::default()
            },
            security: SecurityConfig {
                max_email_size_mb: 0,
            },
            ..Default::default()
        };
        config.validate_and_coerce();
        assert_eq!(config.llm.model_alias, "balanced");
        assert_eq!(config.archive.layout, "v2");
        assert_eq!(config.similarity.min_threshold, 1.0);
        assert_eq!(config.security.max_email_size_mb, 25);
    }

    #[test]
    fn drifted_weights_normalize() {
        let mut config = Config::default();
        config.feature_weights.from_domain = 0.9;
        config.validate_and_coerce();
        assert!((config.feature_weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_thresholds_match_spec() {
        let config = Config::default();
        assert_eq!(config.similarity.skip_llm_threshold, 0.98);
        assert_eq!(config.similarity.min_threshold, 0.5);
        assert_eq!(config.similarity.min_training_examples, 10);
        assert_eq!(config.security.max_email_size_mb, 25);
        assert_eq!(config.storage.max_workflows, 100);
    }

    #[test]
    fn tilde_expansion_uses_home() {
        let archive = ArchiveConfig {
            base_path: "/absolute/archive".to_string(),
            ..Default::default()
        };
        assert_eq!(archive.resolved_base_path(), "/absolute/archive");
    }
}

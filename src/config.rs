//! Checker and runtime configuration

use fx_checker::CheckerOptions;
use fx_runtime::{CoordinatorConfig, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration, read from `fx.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub checker: CheckerConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Accept the deprecated `no_rollback` effect with a warning
    pub allow_no_rollback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fixpoint_rounds: Option<usize>,
    pub warnings_as_errors: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            allow_no_rollback: true,
            max_fixpoint_rounds: None,
            warnings_as_errors: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_contexts: Option<usize>,
    pub trace_journal: bool,
}

impl FxConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e,
        })
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize { error: e })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                error: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checker.max_fixpoint_rounds == Some(0) {
            return Err(ConfigError::invalid(
                "checker.max_fixpoint_rounds",
                "At least one round is required",
            ));
        }
        if self.runtime.step_limit == Some(0) {
            return Err(ConfigError::invalid("runtime.step_limit", "Step limit must be positive"));
        }
        if self.runtime.max_contexts == Some(0) {
            return Err(ConfigError::invalid(
                "runtime.max_contexts",
                "At least one context is required",
            ));
        }
        Ok(())
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(&mut self, other: FxConfig) {
        if !other.checker.allow_no_rollback {
            self.checker.allow_no_rollback = false;
        }
        if other.checker.max_fixpoint_rounds.is_some() {
            self.checker.max_fixpoint_rounds = other.checker.max_fixpoint_rounds;
        }
        if other.checker.warnings_as_errors {
            self.checker.warnings_as_errors = true;
        }
        if other.runtime.step_limit.is_some() {
            self.runtime.step_limit = other.runtime.step_limit;
        }
        if other.runtime.max_contexts.is_some() {
            self.runtime.max_contexts = other.runtime.max_contexts;
        }
        if other.runtime.trace_journal {
            self.runtime.trace_journal = true;
        }
    }

    pub fn checker_options(&self) -> CheckerOptions {
        CheckerOptions {
            deny_no_rollback: !self.checker.allow_no_rollback,
            max_fixpoint_rounds: self.checker.max_fixpoint_rounds,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            engine: EngineConfig {
                step_limit: self.runtime.step_limit,
                trace_journal: self.runtime.trace_journal,
            },
            max_contexts: self.runtime.max_contexts,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error for {path:?}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Parse error for {path:?}: {error}")]
    Parse { path: PathBuf, error: toml::de::Error },

    #[error("Serialization error: {error}")]
    Serialize { error: toml::ser::Error },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Predefined configurations
pub mod presets {
    use super::*;

    /// Reject legacy effects and treat warnings as errors
    pub fn strict() -> FxConfig {
        FxConfig {
            checker: CheckerConfig {
                allow_no_rollback: false,
                max_fixpoint_rounds: None,
                warnings_as_errors: true,
            },
            runtime: RuntimeConfig::default(),
        }
    }

    /// Bounded execution for untrusted programs
    pub fn sandbox() -> FxConfig {
        FxConfig {
            checker: CheckerConfig::default(),
            runtime: RuntimeConfig {
                step_limit: Some(100_000),
                max_contexts: Some(64),
                trace_journal: false,
            },
        }
    }

    pub fn debug() -> FxConfig {
        FxConfig {
            checker: CheckerConfig::default(),
            runtime: RuntimeConfig {
                step_limit: Some(1_000_000),
                max_contexts: None,
                trace_journal: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = FxConfig::default();
        assert!(config.checker.allow_no_rollback);
        assert!(!config.checker.warnings_as_errors);
        assert_eq!(config.runtime.step_limit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = FxConfig::default();
        config.runtime.step_limit = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.runtime.step_limit = Some(10);
        assert!(config.validate().is_ok());

        config.checker.max_fixpoint_rounds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("fx.toml");

        let config = presets::sandbox();
        config.to_file(&config_path).unwrap();
        let loaded = FxConfig::from_file(&config_path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fx.toml");
        std::fs::write(&config_path, "[runtime]\nstep_limit = 500\n").unwrap();

        let loaded = FxConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.runtime.step_limit, Some(500));
        assert!(loaded.checker.allow_no_rollback);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fx.toml");
        std::fs::write(&config_path, "[runtime]\nstep_limit = \"many\"\n").unwrap();
        assert!(matches!(FxConfig::from_file(&config_path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            FxConfig::from_file(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_config_merge() {
        let mut base = presets::sandbox();
        base.merge(presets::strict());
        assert!(!base.checker.allow_no_rollback);
        assert!(base.checker.warnings_as_errors);
        assert_eq!(base.runtime.step_limit, Some(100_000));

        let options = base.checker_options();
        assert!(options.deny_no_rollback);
        assert_eq!(base.coordinator_config().max_contexts, Some(64));
    }
}

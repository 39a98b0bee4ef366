//! Configuration loading and typed config structures for a synk kernel.
//!
//! The canonical configuration lives in `synk-config.yaml` at the project
//! root. Every section and field is optional; anything left out takes the
//! default documented on the field.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use synk_db::DEFAULT_TIERS;

use crate::episode::DEFAULT_ROTATION_PERIOD;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level kernel configuration, mirroring `synk-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KernelConfig {
    /// Episode counter settings.
    #[serde(default)]
    pub episode: EpisodeConfig,

    /// State journal settings.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Tiered storage layout.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SYNK_STATE_PATH` overrides `episode.state_path`
    /// - `SYNK_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.episode.validate()?;
        Ok(config)
    }

    /// Override fields with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SYNK_STATE_PATH") {
            self.episode.state_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("SYNK_LOG_LEVEL") {
            self.logging.level = val;
        }
    }
}

/// Episode counter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpisodeConfig {
    /// Trials per episode. Must be at least 1.
    #[serde(default = "default_rotation_period")]
    pub rotation_period: u64,

    /// JSON file the counter is persisted to. `None` keeps it in memory.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl EpisodeConfig {
    /// Check that the rotation period is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero period.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        match self.period() {
            Some(_) => Ok(()),
            None => Err(ConfigError::Invalid {
                field: "episode.rotation_period",
                reason: "must be at least 1",
            }),
        }
    }

    /// The rotation period, or `None` if it is zero.
    pub const fn period(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.rotation_period)
    }
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            rotation_period: default_rotation_period(),
            state_path: None,
        }
    }
}

/// State journal configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct JournalConfig {
    /// Commit on every write instead of on explicit commit.
    #[serde(default)]
    pub eager: bool,
}

/// Tiered storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Tier names, highest priority first.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error), used when
    /// `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

const fn default_rotation_period() -> u64 {
    DEFAULT_ROTATION_PERIOD.get()
}

fn default_tiers() -> Vec<String> {
    DEFAULT_TIERS.iter().map(|&name| name.to_owned()).collect()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = KernelConfig::default();
        assert_eq!(config.episode.rotation_period, 5);
        assert!(config.episode.state_path.is_none());
        assert!(!config.journal.eager);
        assert_eq!(config.storage.tiers, vec!["cache", "local", "analytics"]);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
episode:
  rotation_period: 10
  state_path: /tmp/synk/counter.json
journal:
  eager: true
storage:
  tiers: [cache, warehouse]
logging:
  level: debug
  format: json
";
        let config = KernelConfig::parse(yaml).unwrap();
        assert_eq!(config.episode.rotation_period, 10);
        assert!(config.journal.eager);
        assert_eq!(config.storage.tiers, vec!["cache", "warehouse"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = KernelConfig::parse("journal:\n  eager: true\n").unwrap();
        assert!(config.journal.eager);
        // Everything else uses defaults
        assert_eq!(config.episode.rotation_period, 5);
        assert_eq!(config.storage.tiers.len(), 3);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(KernelConfig::parse("").is_ok());
    }

    #[test]
    fn zero_rotation_period_rejected() {
        let result = KernelConfig::parse("episode:\n  rotation_period: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "episode.rotation_period",
                ..
            })
        ));
    }

    #[test]
    fn malformed_yaml_is_yaml_error() {
        let result = KernelConfig::parse("episode: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = KernelConfig::from_file(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("synk-config.yaml");
        if path.exists() {
            let config = KernelConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}

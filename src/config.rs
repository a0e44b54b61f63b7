//! Runtime configuration, read from `config.toml`.
//!
//! Every field has a default, so an empty or missing file is valid.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ClassifierConfig;
use crate::paths::ForgePaths;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(forge::config::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(forge::config::parse),
        help("Check the TOML syntax. Unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("invalid config value for `{field}`: {message}")]
    #[diagnostic(code(forge::config::invalid_value))]
    InvalidValue { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    /// Register the definitions compiled into the binary.
    #[serde(default = "default_true")]
    pub bundled_domains: bool,
    /// Scan the XDG data directory (`domains/*.toml`) for definitions.
    #[serde(default = "default_true")]
    pub discover_domains: bool,
    /// Additional definition files, loaded in order after discovery.
    #[serde(default)]
    pub domain_files: Vec<PathBuf>,
    /// Cap on instances spawned from a single extracted count.
    #[serde(default = "default_max_spawn")]
    pub max_spawn: usize,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_true() -> bool {
    true
}
fn default_max_spawn() -> usize {
    32
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            bundled_domains: true,
            discover_domains: true,
            domain_files: Vec::new(),
            max_spawn: default_max_spawn(),
            log_filter: default_log_filter(),
        }
    }
}

impl ForgeConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config at `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from the XDG config location, falling back to defaults when no
    /// home directory can be determined.
    pub fn discover() -> ConfigResult<Self> {
        match ForgePaths::resolve() {
            Ok(paths) => Self::load_or_default(&paths.config_file()),
            Err(e) => {
                tracing::warn!("{e}; using default configuration");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_spawn == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_spawn".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            max_spawn: self.max_spawn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: ForgeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ForgeConfig::default());
        assert_eq!(cfg.classifier().max_spawn, 32);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "bundled_domains = false\nmax_spawn = 4\ndomain_files = [\"/etc/forge/hvac.toml\"]\n",
        )
        .unwrap();
        let cfg = ForgeConfig::load(&path).unwrap();
        assert!(!cfg.bundled_domains);
        assert!(cfg.discover_domains);
        assert_eq!(cfg.max_spawn, 4);
        assert_eq!(cfg.domain_files, vec![PathBuf::from("/etc/forge/hvac.toml")]);
    }

    #[test]
    fn zero_spawn_cap_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_spawn = 0\n").unwrap();
        let err = ForgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_spwan = 3\n").unwrap();
        assert!(matches!(
            ForgeConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ForgeConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, ForgeConfig::default());
    }
}

//! XDG-compliant path resolution for intent-forge.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(forge::paths::no_home),
        help("Set the HOME environment variable, or pass an explicit `--config` file.")
    )]
    NoHome,
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global directories for intent-forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgePaths {
    /// `$XDG_CONFIG_HOME/intent-forge/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/intent-forge/`
    pub data_dir: PathBuf,
}

impl ForgePaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("intent-forge");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("intent-forge");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory scanned for domain definition files.
    pub fn domains_dir(&self) -> PathBuf {
        self.data_dir.join("domains")
    }
}

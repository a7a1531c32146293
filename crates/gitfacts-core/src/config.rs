//! Persistent configuration for gitfacts.
//!
//! Loads/saves a TOML config at `~/.gitfacts/config.toml`.

use crate::GitfactsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level gitfacts configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitfactsConfig {
    pub repository: RepositoryConfig,
    pub scanners: ScannersConfig,
    pub logging: LoggingConfig,
}

impl GitfactsConfig {
    /// Load configuration from the given path.
    pub fn load(path: &Path) -> Result<Self, GitfactsError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GitfactsError::Config(e.to_string()))
    }

    /// Save configuration to the given path.
    pub fn save(&self, path: &Path) -> Result<(), GitfactsError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| GitfactsError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default path, or return defaults if the file doesn't exist.
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Default config path: `~/.gitfacts/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gitfacts")
            .join("config.toml")
    }
}

/// Which repository queries run against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository root. Unset means the current working directory.
    pub path: Option<PathBuf>,
}

impl RepositoryConfig {
    /// The configured path, falling back to the current working directory.
    pub fn resolve(&self) -> Result<PathBuf, GitfactsError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Scanner selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannersConfig {
    /// Built-in scanners to leave out of the registry, by name.
    pub disabled: Vec<String>,
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive, combined with `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gitfacts=info".to_string(),
        }
    }
}

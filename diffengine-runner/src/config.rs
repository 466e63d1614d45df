//! `DiffEngineConfig`: TOML-loaded settings overlaid by CLI flags, mirroring
//! the teacher's `toml` dependency for `airev.toml`-style configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiffEngineConfig {
    /// Path to the WAL-mode SQLite database.
    pub database: PathBuf,
    /// Path to the git repository being analyzed.
    pub repository: PathBuf,
    /// Maximum number of blocking jobs executed concurrently.
    pub workers: usize,
    /// How often `scan_incomplete` re-polls for resumable work, in seconds.
    pub poll_interval_secs: u64,
}

impl Default for DiffEngineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("diffengine.db"),
            repository: PathBuf::from("."),
            workers: 4,
            poll_interval_secs: 2,
        }
    }
}

impl DiffEngineConfig {
    /// Loads config from `path`, falling back to defaults for any field the
    /// file omits. Returns defaults outright if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

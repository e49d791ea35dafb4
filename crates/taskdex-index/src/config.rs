use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = ".taskdex";
const CONFIG_FILE: &str = "config.toml";

/// Store size below which an unfiltered query skips id-set construction.
pub const DEFAULT_SMALL_STORE_THRESHOLD: usize = 1000;

/// Errors raised while loading [`IndexerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse {}", path.display())]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
}

/// Tunables of the indexer, loaded from `.taskdex/config.toml`.
///
/// ```toml
/// small_store_threshold = 500
/// skip_unchanged_files = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unfiltered queries on stores smaller than this return every task
    /// directly. `0` disables the shortcut.
    pub small_store_threshold: usize,
    /// Skip re-parsing files whose cached tasks are still valid for the
    /// reported mtime.
    pub skip_unchanged_files: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            small_store_threshold: DEFAULT_SMALL_STORE_THRESHOLD,
            skip_unchanged_files: true,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from `<root>/.taskdex/config.toml`, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = root.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }
}

//! Manager configuration

use std::fs;
use std::path::{Path, PathBuf};

use gm_core::url::DEFAULT_GREASEABLE_SCHEMES;
use serde::{Deserialize, Serialize};

/// Error type for loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for a [`crate::ScriptManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory scripts are loaded from, when file-backed
    pub scripts_dir: Option<PathBuf>,
    /// URL schemes scripts may run on; anything else gets no scripts
    pub greaseable_schemes: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scripts_dir: None,
            greaseable_schemes: DEFAULT_GREASEABLE_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ManagerConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether scripts may run on URLs with `scheme`.
    pub fn is_greaseable(&self, scheme: &str) -> bool {
        self.greaseable_schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

//! Script storage
//!
//! Scripts live as plain files in a directory; downloaded `@require`
//! resources are cached next to them in a `requires/` subdirectory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Subdirectory of the scripts directory holding cached requirements.
pub const REQUIRES_DIR: &str = "requires";

/// Only files with this extension are loaded as scripts.
pub const SCRIPT_EXTENSION: &str = "js";

/// Error type for storage access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Script not found: {0}")]
    NotFound(String),
    #[error("Invalid script name: {0:?}")]
    InvalidName(String),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where scripts and cached requirements come from.
pub trait ScriptStorage {
    /// Script names, in the order they should be registered.
    fn list_scripts(&self) -> Result<Vec<String>, StorageError>;

    fn read_script(&self, name: &str) -> Result<String, StorageError>;

    fn save_script(&mut self, name: &str, source: &str) -> Result<(), StorageError>;

    /// Cached body of a required resource, if present.
    fn read_required(&self, url: &str) -> Option<String>;

    fn write_required(&mut self, url: &str, source: &str) -> Result<(), StorageError>;
}

// =============================================================================
// Directory Storage
// =============================================================================

/// Scripts stored as files in a directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a required URL is cached under.
    pub fn required_path(&self, url: &str) -> PathBuf {
        self.root.join(REQUIRES_DIR).join(sanitize_filename(url))
    }

    fn script_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

impl ScriptStorage for DirStorage {
    fn list_scripts(&self) -> Result<Vec<String>, StorageError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
            log::debug!("created scripts directory {}", self.root.display());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let is_script = Path::new(&entry.file_name())
                .extension()
                .map_or(false, |ext| ext == SCRIPT_EXTENSION);
            if !is_file || !is_script {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::warn!("skipping script with non UTF-8 name {:?}", raw),
            }
        }

        names.sort();
        Ok(names)
    }

    fn read_script(&self, name: &str) -> Result<String, StorageError> {
        let path = self.script_path(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::io(&path, e),
        })
    }

    fn save_script(&mut self, name: &str, source: &str) -> Result<(), StorageError> {
        let path = self.script_path(name)?;
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        fs::write(&path, source).map_err(|e| StorageError::io(&path, e))
    }

    fn read_required(&self, url: &str) -> Option<String> {
        fs::read_to_string(self.required_path(url)).ok()
    }

    fn write_required(&mut self, url: &str, source: &str) -> Result<(), StorageError> {
        let path = self.required_path(url);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        fs::write(&path, source).map_err(|e| StorageError::io(&path, e))
    }
}

/// Replace every character that is unsafe in a filename with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// =============================================================================
// Memory Storage
// =============================================================================

/// In-memory storage, listed in name order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    scripts: BTreeMap<String, String>,
    required: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ScriptStorage::save_script`].
    pub fn with_script(mut self, name: &str, source: &str) -> Self {
        self.scripts.insert(name.to_string(), source.to_string());
        self
    }

    /// Builder-style [`ScriptStorage::write_required`].
    pub fn with_required(mut self, url: &str, source: &str) -> Self {
        self.required.insert(url.to_string(), source.to_string());
        self
    }

    pub fn remove_script(&mut self, name: &str) -> Option<String> {
        self.scripts.remove(name)
    }
}

impl ScriptStorage for MemoryStorage {
    fn list_scripts(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.scripts.keys().cloned().collect())
    }

    fn read_script(&self, name: &str) -> Result<String, StorageError> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn save_script(&mut self, name: &str, source: &str) -> Result<(), StorageError> {
        self.scripts.insert(name.to_string(), source.to_string());
        Ok(())
    }

    fn read_required(&self, url: &str) -> Option<String> {
        self.required.get(url).cloned()
    }

    fn write_required(&mut self, url: &str, source: &str) -> Result<(), StorageError> {
        self.required.insert(url.to_string(), source.to_string());
        Ok(())
    }
}

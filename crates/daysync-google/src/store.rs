//! Key-value settings backends.
//!
//! Token persistence goes through the [`SettingsStore`] trait. Two backends
//! exist and the caller picks them once at startup:
//!
//! - [`HostSettingsStore`]: a single JSON settings map shared with other
//!   settings. Writes merge into the map and keep unrelated keys.
//! - [`LocalFallbackStore`]: a private directory holding one file per key.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{GoogleError, GoogleResult};

/// A string-valued key-value store.
pub trait SettingsStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Reads the value stored under `key`.
    fn read(&self, key: &str) -> GoogleResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> GoogleResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> GoogleResult<()>;
}

/// Settings map persisted as one JSON object.
#[derive(Debug)]
pub struct HostSettingsStore {
    path: PathBuf,
}

impl HostSettingsStore {
    /// Creates a store backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> GoogleResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            GoogleError::storage(format!(
                "failed to read settings file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            GoogleError::storage(format!(
                "settings file {} is not a JSON object: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_map(&self, map: &Map<String, Value>) -> GoogleResult<()> {
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| GoogleError::internal(format!("failed to serialize settings: {}", e)))?;
        write_private(&self.path, &content)
    }
}

impl SettingsStore for HostSettingsStore {
    fn name(&self) -> &str {
        "host-settings"
    }

    fn read(&self, key: &str) -> GoogleResult<Option<String>> {
        let map = self.read_map()?;
        Ok(map.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn write(&self, key: &str, value: &str) -> GoogleResult<()> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map)?;
        debug!(key, path = %self.path.display(), "wrote host setting");
        Ok(())
    }

    fn remove(&self, key: &str) -> GoogleResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
            debug!(key, path = %self.path.display(), "removed host setting");
        }
        Ok(())
    }
}

/// One file per key under a private directory.
#[derive(Debug)]
pub struct LocalFallbackStore {
    dir: PathBuf,
}

impl LocalFallbackStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(file)
    }
}

impl SettingsStore for LocalFallbackStore {
    fn name(&self) -> &str {
        "local"
    }

    fn read(&self, key: &str) -> GoogleResult<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path).map(Some).map_err(|e| {
            GoogleError::storage(format!("failed to read {}: {}", path.display(), e))
        })
    }

    fn write(&self, key: &str, value: &str) -> GoogleResult<()> {
        let path = self.key_path(key);
        write_private(&path, value)?;
        debug!(key, path = %path.display(), "wrote local setting");
        Ok(())
    }

    fn remove(&self, key: &str) -> GoogleResult<()> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                GoogleError::storage(format!("failed to remove {}: {}", path.display(), e))
            })?;
            debug!(key, path = %path.display(), "removed local setting");
        }
        Ok(())
    }
}

/// Writes `content` to `path` through a temp file and a rename, with
/// owner-only permissions on Unix.
fn write_private(path: &Path, content: &str) -> GoogleResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GoogleError::storage(format!(
                "failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).map_err(|e| {
        GoogleError::storage(format!("failed to write {}: {}", temp_path.display(), e))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600)) {
            warn!(path = %temp_path.display(), error = %e, "failed to restrict permissions");
            let _ = fs::remove_file(&temp_path);
            return Err(GoogleError::storage(format!(
                "failed to restrict permissions of {}: {}",
                temp_path.display(),
                e
            )));
        }
    }

    fs::rename(&temp_path, path).map_err(|e| {
        GoogleError::storage(format!("failed to rename {}: {}", temp_path.display(), e))
    })
}

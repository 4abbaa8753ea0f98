//! Persistent port status store
//!
//! The whole mapping is read and written at once. Writers serialize through
//! an advisory lock on a sibling `.lock` file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::tunnel::{Port, ServiceRecord};

/// Port → record mapping as persisted
pub type StatusMap = BTreeMap<Port, ServiceRecord>;

/// JSON file holding every [`ServiceRecord`]
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

/// Exclusive hold on the store; released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default XDG data location
    pub fn open_default() -> Self {
        Self::new(expose_paths::status_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Read the whole mapping.
    ///
    /// A missing or unreadable file is an empty mapping and is left in
    /// place. A file that does not parse is moved aside to `<file>.corrupt`.
    pub fn load(&self) -> StatusMap {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return StatusMap::new(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read status store, starting from an empty mapping"
                );
                return StatusMap::new();
            }
        };

        if content.trim().is_empty() {
            return StatusMap::new();
        }

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                self.quarantine(&e.to_string());
                StatusMap::new()
            }
        }
    }

    /// Replace the whole mapping on disk
    pub fn save(&self, map: &StatusMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(map)?;
        let tmp = sibling(&self.path, "tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), records = map.len(), "Saved status store");
        Ok(())
    }

    /// Take the exclusive lock, waiting for other invocations if needed
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::Lock {
                path: path.clone(),
                source,
            })?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            info!(path = %path.display(), "Waiting for another expose invocation to finish");
            FileExt::lock_exclusive(&file).map_err(|source| StoreError::Lock {
                path: path.clone(),
                source,
            })?;
        }

        debug!(path = %path.display(), "Acquired store lock");
        Ok(StoreLock { file, path })
    }

    fn quarantine(&self, reason: &str) {
        let backup = sibling(&self.path, "corrupt");
        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            reason,
            "Status store is corrupt, starting from an empty mapping"
        );
        if let Err(e) = fs::rename(&self.path, &backup) {
            warn!(path = %self.path.display(), error = %e, "Failed to move corrupt status store aside");
        }
    }
}

/// `status.json` → `status.json.<ext>`
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

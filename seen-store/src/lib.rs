//! Persistent set of post identifiers that have already been delivered.
//!
//! Stored as a JSON list of strings in first-seen order. Saves go through a
//! temporary file in the same directory followed by a rename, so a crash
//! mid-write leaves the previous file intact.

use indexmap::IndexSet;
use memerelay_core::PersistenceError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};


#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    ids: IndexSet<String>,
    dirty: bool,
}

impl SeenStore {
    /// Empty store that will be written to `path` on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: IndexSet::new(),
            dirty: false,
        }
    }

    /// Load the store from disk. A missing file yields an empty store; an
    /// unreadable or malformed one is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No seen-set at {}, starting empty", path.display());
                return Ok(Self::new(path));
            }
            Err(e) => {
                return Err(PersistenceError::ReadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let ids: IndexSet<String> =
            serde_json::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!("Loaded {} seen post ids from {}", ids.len(), path.display());
        Ok(Self {
            path,
            ids,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record an id. Returns false when it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let inserted = self.ids.insert(id.into());
        self.dirty |= inserted;
        inserted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// True when ids were added since the last successful save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Write the whole set atomically.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        let write_failed = |reason: String| PersistenceError::WriteFailed {
            path: self.path.display().to_string(),
            reason,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| write_failed(e.to_string()))?;

        let json = serde_json::to_string(&self.ids).map_err(|e| write_failed(e.to_string()))?;
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| write_failed(e.to_string()))?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| write_failed(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| write_failed(e.error.to_string()))?;

        self.dirty = false;
        debug!("Saved {} seen post ids to {}", self.ids.len(), self.path.display());
        Ok(())
    }
}

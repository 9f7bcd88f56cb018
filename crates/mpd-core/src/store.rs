//! Durable project configuration
//!
//! The whole document lives in one TOML file. Every save writes a temporary
//! file next to the target and renames it into place, so readers only ever
//! observe the previous or the next complete document.

use crate::project::Project;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors reading or writing persisted state.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to encode '{}': {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to replace '{}': {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Mapping of project name to project record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
}

/// A fully written temporary file waiting to replace its target.
///
/// Dropping it without calling [`StagedWrite::commit`] removes the
/// temporary file and leaves the target untouched.
pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Write `contents` to a temporary file in the target's directory.
    pub fn stage(target: &Path, contents: &[u8]) -> Result<Self, StorageError> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
        file.write_all(contents)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| StorageError::io(file.path(), e))?;

        Ok(Self {
            file,
            target: target.to_path_buf(),
        })
    }

    /// Atomically rename the temporary file over the target.
    pub fn commit(self) -> Result<(), StorageError> {
        self.file
            .persist(&self.target)
            .map_err(|e| StorageError::Persist {
                path: self.target.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

/// Replace `target` with `contents` atomically.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), StorageError> {
    StagedWrite::stage(target, contents)?.commit()
}

/// Handle on the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `None` if it has never been written.
    pub fn load(&self) -> Result<Option<ConfigDocument>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Load the document, treating a missing file as empty.
    pub fn load_or_default(&self) -> Result<ConfigDocument, StorageError> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// Write the document atomically.
    pub fn save(&self, doc: &ConfigDocument) -> Result<(), StorageError> {
        let text = toml::to_string_pretty(doc)?;
        write_atomic(&self.path, text.as_bytes())?;
        debug!(path = %self.path.display(), projects = doc.projects.len(), "saved configuration");
        Ok(())
    }

    /// Look up one project.
    pub fn get(&self, name: &str) -> Result<Option<Project>, StorageError> {
        Ok(self
            .load()?
            .and_then(|mut doc| doc.projects.remove(name)))
    }

    /// Insert or replace a project and save.
    pub fn put(&self, project: &Project) -> Result<(), StorageError> {
        let mut doc = self.load_or_default()?;
        doc.projects.insert(project.name.clone(), project.clone());
        self.save(&doc)
    }

    /// Remove a project and save. Returns the removed record, if any.
    pub fn remove(&self, name: &str) -> Result<Option<Project>, StorageError> {
        let mut doc = self.load_or_default()?;
        let removed = doc.projects.remove(name);
        if removed.is_some() {
            self.save(&doc)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectStatus;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> ConfigStore {
        ConfigStore::new(temp.path().join("config.toml"))
    }

    #[test]
    fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp).load().unwrap().is_none());
        assert!(store(&temp).get("demo").unwrap().is_none());
    }

    #[test]
    fn test_put_get_remove() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut project = Project::new("demo", "/work/demo", "/work/demo/srcs");
        project.status = ProjectStatus::Created;
        store.put(&project).unwrap();
        store
            .put(&Project::new("other", "/work/other", "/work/other/srcs"))
            .unwrap();

        assert_eq!(store.get("demo").unwrap(), Some(project.clone()));
        assert_eq!(store.remove("demo").unwrap(), Some(project));
        assert!(store.get("demo").unwrap().is_none());
        assert!(store.get("other").unwrap().is_some());
        assert!(store.remove("demo").unwrap().is_none());
    }

    #[test]
    fn test_save_is_byte_stable() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .put(&Project::new("demo", "/work/demo", "/work/demo/srcs"))
            .unwrap();
        let first = fs::read(store.path()).unwrap();

        let doc = store.load().unwrap().unwrap();
        store.save(&doc).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), first);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_document() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .put(&Project::new("demo", "/work/demo", "/work/demo/srcs"))
            .unwrap();
        let before = fs::read(store.path()).unwrap();

        // Simulate a crash between writing the temporary file and renaming it
        let staged = StagedWrite::stage(store.path(), b"").unwrap();
        drop(staged);

        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(!before.is_empty());
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_parse_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::write(store.path(), "projects = [").unwrap();
        assert!(matches!(store.load(), Err(StorageError::Parse { .. })));
    }
}

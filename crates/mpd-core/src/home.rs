//! Location of per-user state

use crate::store::{ConfigStore, StorageError};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the state root.
pub const MPD_HOME_ENV: &str = "MPD_HOME";

/// The per-user state root (`$MPD_HOME`, else `~/.mpd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpdHome {
    root: PathBuf,
}

impl MpdHome {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the state root from the environment.
    ///
    /// Returns `None` when neither `$MPD_HOME` nor a home directory is available.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        if let Some(root) = std::env::var_os(MPD_HOME_ENV).filter(|v| !v.is_empty()) {
            return Some(Self::new(root));
        }
        dirs::home_dir().map(|home| Self::new(home.join(".mpd")))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    #[must_use]
    pub fn selections_dir(&self) -> PathBuf {
        self.root.join("selected")
    }

    /// Local package repository registered with the resolver.
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Scripts that generated build files run at install time.
    #[must_use]
    pub fn hooks_dir(&self) -> PathBuf {
        self.root.join("hooks")
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.toml")
    }

    #[must_use]
    pub fn store(&self) -> ConfigStore {
        ConfigStore::new(self.config_file())
    }

    /// Initialized means the selection directory exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.selections_dir().is_dir()
    }

    /// Create the state directories. Existing directories are kept.
    pub fn initialize(&self) -> Result<(), StorageError> {
        for dir in [self.root.clone(), self.selections_dir(), self.packages_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let home = MpdHome::new("/state");
        assert_eq!(home.config_file(), PathBuf::from("/state/config.toml"));
        assert_eq!(home.selections_dir(), PathBuf::from("/state/selected"));
        assert_eq!(home.packages_dir(), PathBuf::from("/state/packages"));
        assert_eq!(home.settings_file(), PathBuf::from("/state/settings.toml"));
    }

    #[test]
    fn test_initialize() {
        let temp = TempDir::new().unwrap();
        let home = MpdHome::new(temp.path().join("mpd"));
        assert!(!home.is_initialized());

        home.initialize().unwrap();
        home.initialize().unwrap();
        assert!(home.is_initialized());
        assert!(home.packages_dir().is_dir());
    }
}

//! User settings (`settings.toml`)

use crate::project::{DEFAULT_CXXSTD, DEFAULT_GENERATOR};
use crate::store::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Tool locations and defaults. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub spack: PathBuf,
    pub cmake: PathBuf,
    pub ctest: PathBuf,
    pub git: PathBuf,
    /// Default number of parallel build jobs.
    pub parallelism: usize,
    pub cxxstd: String,
    pub generator: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spack: PathBuf::from("spack"),
            cmake: PathBuf::from("cmake"),
            ctest: PathBuf::from("ctest"),
            git: PathBuf::from("git"),
            parallelism: default_parallelism(),
            cxxstd: DEFAULT_CXXSTD.to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
        }
    }
}

/// Half the available cores, at least one.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        match fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|source| StorageError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

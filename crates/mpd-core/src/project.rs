//! The persisted project record and its on-disk directories

use crate::requirement::PackageRequirement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Placeholder printed and persisted for absent values.
pub const NONE_STR: &str = "(none)";

/// Default C++ standard for packages that declare a `cxxstd` variant.
pub const DEFAULT_CXXSTD: &str = "17";

/// Default build-system generator.
pub const DEFAULT_GENERATOR: &str = "make";

/// Development status of a project.
///
/// Transitions are persisted in order: `(none)` -> `created` ->
/// `concretized` -> `ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    #[serde(rename = "(none)")]
    None,
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "concretized")]
    Concretized,
    #[serde(rename = "ready")]
    Ready,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => NONE_STR,
            Self::Created => "created",
            Self::Concretized => "concretized",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Resolved compiler paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub c: PathBuf,
    pub cxx: PathBuf,
}

/// When and into which environment the project was last installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub environment: PathBuf,
    pub at: DateTime<Utc>,
}

/// A development project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub top: PathBuf,
    pub source: PathBuf,
    pub build: PathBuf,
    /// Directory of the resolver environment for this project.
    pub local: PathBuf,

    /// Base environments the project environment includes.
    #[serde(default)]
    pub envs: Vec<String>,

    /// Raw general variant string from the command line.
    #[serde(default)]
    pub variants: String,

    /// Raw explicit-dependency specs from the command line.
    #[serde(default)]
    pub dependency_specs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    #[serde(default = "default_cxxstd")]
    pub cxxstd: String,

    #[serde(default = "default_generator")]
    pub generator: String,

    #[serde(default)]
    pub status: ProjectStatus,

    /// Directories in the source tree that are not declarable packages.
    #[serde(default)]
    pub ignored: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<Toolchain>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstallRecord>,

    /// Requirements for every developed package.
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRequirement>,

    /// Requirements for packages resolved externally.
    #[serde(default)]
    pub dependencies: BTreeMap<String, PackageRequirement>,

    #[serde(default)]
    pub virtual_providers: BTreeMap<String, Vec<String>>,
}

fn default_cxxstd() -> String {
    DEFAULT_CXXSTD.to_string()
}

fn default_generator() -> String {
    DEFAULT_GENERATOR.to_string()
}

impl Project {
    /// A fresh project with the conventional directory layout under `top`.
    #[must_use]
    pub fn new(name: impl Into<String>, top: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        let top = top.into();
        Self {
            name: name.into(),
            build: top.join("build"),
            local: top.join("local"),
            source: source.into(),
            top,
            envs: Vec::new(),
            variants: String::new(),
            dependency_specs: Vec::new(),
            compiler: None,
            toolchain: None,
            cxxstd: default_cxxstd(),
            generator: default_generator(),
            status: ProjectStatus::None,
            installed: None,
            ignored: Vec::new(),
            packages: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            virtual_providers: BTreeMap::new(),
        }
    }

    /// Names of the developed packages, sorted.
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    #[must_use]
    pub fn has_packages(&self) -> bool {
        !self.packages.is_empty()
    }

    /// Create the top, source, build, and local directories.
    ///
    /// Existing directories are left alone. The stored paths are replaced
    /// with their absolute forms.
    pub fn prepare_directories(&mut self) -> io::Result<()> {
        for dir in [&self.top, &self.source, &self.build, &self.local] {
            fs::create_dir_all(dir)?;
        }
        self.top = fs::canonicalize(&self.top)?;
        self.source = fs::canonicalize(&self.source)?;
        self.build = fs::canonicalize(&self.build)?;
        self.local = fs::canonicalize(&self.local)?;
        Ok(())
    }

    /// Non-hidden directories in the source tree, sorted by name.
    pub fn discover_packages(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.source)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Whether two paths name the same directory on disk.
///
/// Both paths must exist; a missing path never matches.
#[must_use]
pub fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

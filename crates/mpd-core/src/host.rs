//! Seams to the external tools a project is built with
//!
//! The resolver (package manager), build tool, and source-control client
//! are reached only through the traits in this module. Production
//! implementations shell out; tests substitute in-memory fakes.

use crate::project::{Project, Toolchain};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// A failure reported by, or while running, an external tool.
#[derive(Error, Debug)]
pub enum ExternalToolError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed with exit code {}", .code.map_or_else(|| "(signal)".to_string(), |c| c.to_string()))]
    Failed { command: String, code: Option<i32> },

    #[error("unexpected output from '{command}': {reason}")]
    Output { command: String, reason: String },

    #[error("no compiler matching '{0}' was found")]
    CompilerNotFound(String),

    #[error("'{}' is not an environment", .0.display())]
    NotAnEnvironment(PathBuf),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExternalToolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The tool's exit code, when it ran to completion and failed.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Whether a resolved package is available on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallStatus {
    /// Must be built before the project can be developed.
    #[default]
    Absent,
    /// Provided by the system, outside the resolver's store.
    External,
    Installed,
}

/// One concrete package in a resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedNode {
    pub name: String,
    pub version: String,
    pub hash: String,
    pub prefix: PathBuf,
    pub status: InstallStatus,
    /// Names of direct dependencies.
    pub dependencies: BTreeSet<String>,
    /// `-DNAME:TYPE=VALUE` arguments the package passes to CMake.
    pub cmake_args: Vec<String>,
    /// Short spec used when listing the node (`root@6.30%gcc@13+x11`).
    pub spec: String,
}

/// A concrete dependency graph produced by concretization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedGraph {
    pub nodes: BTreeMap<String, ResolvedNode>,
    /// Directory of the environment view (`lib`, `include`, ...).
    pub view: PathBuf,
}

impl ResolvedGraph {
    pub fn insert(&mut self, node: ResolvedNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&ResolvedNode> {
        self.nodes.get(name)
    }

    /// Every package with its direct dependencies.
    #[must_use]
    pub fn direct_edges(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.dependencies.clone()))
            .collect()
    }

    /// Everything reachable from `name`, excluding `name` itself.
    #[must_use]
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for dep in &node.dependencies {
                if dep != name && seen.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }
        seen
    }

    /// For each developed package, the developed packages it depends on.
    #[must_use]
    pub fn developed_edges(&self, developed: &BTreeSet<String>) -> BTreeMap<String, BTreeSet<String>> {
        developed
            .iter()
            .map(|name| {
                let deps = self
                    .transitive_dependencies(name)
                    .intersection(developed)
                    .cloned()
                    .collect();
                (name.clone(), deps)
            })
            .collect()
    }

    /// Direct dependencies of developed packages that are not developed.
    #[must_use]
    pub fn first_order_dependencies(&self, developed: &BTreeSet<String>) -> BTreeSet<String> {
        developed
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .flat_map(|node| node.dependencies.iter())
            .filter(|dep| !developed.contains(*dep))
            .cloned()
            .collect()
    }

    /// Short specs of non-developed packages that still need installing.
    #[must_use]
    pub fn absent_dependencies(&self, developed: &BTreeSet<String>) -> Vec<String> {
        let absent: BTreeSet<_> = self
            .nodes
            .values()
            .filter(|node| !developed.contains(&node.name))
            .filter(|node| node.status == InstallStatus::Absent)
            .map(|node| node.spec.clone())
            .collect();
        absent.into_iter().collect()
    }
}

/// What the resolver knows about a package recipe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    /// Names of the variants the package declares.
    pub variants: BTreeSet<String>,
}

impl PackageInfo {
    #[must_use]
    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.contains(name)
    }
}

/// The external package manager.
pub trait Resolver {
    /// `None` when `name` is not a package the resolver can build.
    fn describe_package(&self, name: &str) -> Result<Option<PackageInfo>, ExternalToolError>;

    /// C and C++ compiler paths for a compiler spec such as `gcc@13`.
    fn find_compiler(&self, spec: &str) -> Result<Option<Toolchain>, ExternalToolError>;

    /// Whether `dir` holds an environment.
    fn is_environment(&self, dir: &Path) -> bool;

    /// Directory of the currently active environment, if any.
    fn active_environment(&self) -> Option<PathBuf>;

    /// Create (or recreate) the project's environment from its requirements.
    fn create_environment(&self, project: &Project) -> Result<(), ExternalToolError>;

    /// Concretize the project's environment.
    fn concretize(&self, project: &Project) -> Result<ResolvedGraph, ExternalToolError>;

    /// Turn the concretized environment into a development environment in
    /// `project.local`: the first-order dependencies become roots and the
    /// developed packages are removed.
    fn develop_against(
        &self,
        project: &Project,
        first_order: &BTreeSet<String>,
    ) -> Result<ResolvedGraph, ExternalToolError>;

    /// Install the development environment.
    fn install(&self, env: &Path, parallelism: usize) -> Result<(), ExternalToolError>;

    /// Uninstall developed packages that were installed through the project.
    fn uninstall(&self, project: &Project, packages: &[String]) -> Result<(), ExternalToolError>;

    /// Remove every environment belonging to the project.
    fn destroy_environment(&self, project: &Project) -> Result<(), ExternalToolError>;

    /// Register a local package repository.
    fn register_repository(&self, dir: &Path) -> Result<(), ExternalToolError>;
}

/// Build-system generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Generator {
    #[default]
    Make,
    Ninja,
}

impl Generator {
    /// Parse the `generator` variant value.
    #[must_use]
    pub fn from_variant(value: &str) -> Option<Self> {
        match value {
            "make" => Some(Self::Make),
            "ninja" => Some(Self::Ninja),
            _ => None,
        }
    }

    /// Name passed to `cmake -G`.
    #[must_use]
    pub fn cmake_name(self) -> &'static str {
        match self {
            Self::Make => "Unix Makefiles",
            Self::Ninja => "Ninja",
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Make => "make",
            Self::Ninja => "ninja",
        })
    }
}

/// Inputs to a configure step.
#[derive(Debug, Clone)]
pub struct ConfigureRequest<'a> {
    pub source: &'a Path,
    pub build: &'a Path,
    pub install_prefix: &'a Path,
    pub generator: Generator,
    pub toolchain: Option<&'a Toolchain>,
}

/// The build tool driving configure, build, and test.
pub trait BuildTool {
    fn configure(&self, request: &ConfigureRequest<'_>) -> Result<(), ExternalToolError>;

    /// Build `target` (the default target when `None`).
    fn build(
        &self,
        build: &Path,
        parallelism: Option<usize>,
        target: Option<&str>,
        extra_args: &[String],
    ) -> Result<(), ExternalToolError>;

    fn test(&self, build: &Path, parallelism: Option<usize>) -> Result<(), ExternalToolError>;
}

/// Result of cloning one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    AlreadyExists,
    Failed(String),
}

/// The source-control client.
pub trait SourceControl {
    fn clone_repository(&self, url: &str, destination: &Path) -> CloneOutcome;
}

/// Render a command line for logs and error messages.
pub(crate) fn command_line(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run a command with inherited stdio; a non-zero exit is an error.
pub(crate) fn run(command: &mut Command) -> Result<(), ExternalToolError> {
    let line = command_line(command);
    debug!(command = %line, "running");
    let status = command.status().map_err(|source| ExternalToolError::Spawn {
        program: command.get_program().to_string_lossy().into_owned(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(ExternalToolError::Failed {
            command: line,
            code: status.code(),
        })
    }
}

/// Run a command and return its standard output.
pub(crate) fn capture(command: &mut Command) -> Result<String, ExternalToolError> {
    let line = command_line(command);
    debug!(command = %line, "capturing");
    let output = command
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| ExternalToolError::Spawn {
            program: command.get_program().to_string_lossy().into_owned(),
            source,
        })?;
    if !output.status.success() {
        return Err(ExternalToolError::Failed {
            command: line,
            code: output.status.code(),
        });
    }
    String::from_utf8(output.stdout).map_err(|e| ExternalToolError::Output {
        command: line,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, deps: &[&str], status: InstallStatus) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            version: "1.0".to_string(),
            hash: format!("{name}hash"),
            prefix: PathBuf::from(format!("/store/{name}")),
            status,
            dependencies: deps.iter().map(|d| (*d).to_string()).collect(),
            cmake_args: Vec::new(),
            spec: format!("{name}@1.0"),
        }
    }

    fn graph() -> ResolvedGraph {
        let mut graph = ResolvedGraph::default();
        graph.insert(node("art", &["canvas", "root"], InstallStatus::Absent));
        graph.insert(node("canvas", &["cetlib"], InstallStatus::Absent));
        graph.insert(node("cetlib", &["boost"], InstallStatus::Absent));
        graph.insert(node("root", &["zlib"], InstallStatus::Absent));
        graph.insert(node("boost", &[], InstallStatus::Installed));
        graph.insert(node("zlib", &[], InstallStatus::External));
        graph
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_transitive_dependencies() {
        assert_eq!(
            graph().transitive_dependencies("art"),
            set(&["boost", "canvas", "cetlib", "root", "zlib"])
        );
        assert!(graph().transitive_dependencies("zlib").is_empty());
    }

    #[test]
    fn test_developed_edges_are_transitive() {
        let edges = graph().developed_edges(&set(&["art", "cetlib"]));
        assert_eq!(edges["art"], set(&["cetlib"]));
        assert!(edges["cetlib"].is_empty());
    }

    #[test]
    fn test_first_order_dependencies() {
        let first = graph().first_order_dependencies(&set(&["art", "canvas"]));
        assert_eq!(first, set(&["cetlib", "root"]));
    }

    #[test]
    fn test_absent_dependencies_skip_developed() {
        let absent = graph().absent_dependencies(&set(&["art"]));
        assert_eq!(absent, vec!["canvas@1.0", "cetlib@1.0", "root@1.0"]);
    }

    #[test]
    fn test_generator_names() {
        assert_eq!(Generator::from_variant("ninja"), Some(Generator::Ninja));
        assert_eq!(Generator::from_variant("scons"), None);
        assert_eq!(Generator::Make.cmake_name(), "Unix Makefiles");
        assert_eq!(Generator::Ninja.to_string(), "ninja");
    }

    #[test]
    fn test_run_reports_exit_code() {
        let err = run(Command::new("sh").args(["-c", "exit 3"])).unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn test_capture_stdout() {
        let out = capture(Command::new("sh").args(["-c", "echo hello"])).unwrap();
        assert_eq!(out.trim(), "hello");
    }
}

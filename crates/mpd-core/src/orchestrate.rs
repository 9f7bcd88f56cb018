//! Workspace orchestration
//!
//! [`Orchestrator`] owns the durable state handles (configuration store,
//! session selector, settings) and borrows the external tool seams. Every
//! command of the command-line interface maps onto one method here.
//!
//! Status transitions are persisted in order, each before the next step
//! begins: `(none)` -> `created` -> `concretized` -> `ready`.

use crate::buildfiles::{write_build_files, InstallHooks};
use crate::classify::VariantClassifier;
use crate::error::{Error, Result};
use crate::home::MpdHome;
use crate::host::{
    BuildTool, CloneOutcome, ConfigureRequest, ExternalToolError, Generator, PackageInfo, Resolver,
    SourceControl,
};
use crate::lifecycle::{Lifecycle, Predicate};
use crate::order::{order, verify_no_missing_intermediate_dependencies};
use crate::project::{same_directory, InstallRecord, Project, ProjectStatus};
use crate::reconcile::{reconcile_cache, ReconcileReport};
use crate::repos;
use crate::requirement::PackageRequirement;
use crate::session::{ProcessTable, SelectOutcome, SessionSelector};
use crate::settings::Settings;
use crate::spec::Variant;
use crate::store::{ConfigStore, StorageError};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The external collaborators an [`Orchestrator`] drives.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub resolver: &'a dyn Resolver,
    pub build: &'a dyn BuildTool,
    pub source_control: &'a dyn SourceControl,
    pub processes: &'a dyn ProcessTable,
}

/// Inputs to [`Orchestrator::new_project`].
#[derive(Debug, Clone, Default)]
pub struct NewProjectRequest {
    pub name: String,
    pub top: PathBuf,
    /// Defaults to `<top>/srcs`.
    pub source: Option<PathBuf>,
    pub envs: Vec<String>,
    /// General variant channel.
    pub variants: String,
    /// Explicit dependency channel.
    pub dependency_specs: Vec<String>,
    /// Replace an existing project of the same name.
    pub force: bool,
}

/// Result of [`Orchestrator::new_project`].
#[derive(Debug, Clone)]
pub struct NewProject {
    pub project: Project,
    /// An existing project of the same name was replaced.
    pub replaced: bool,
    pub selection: SelectOutcome,
}

/// Result of [`Orchestrator::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// Nothing changed; the stored record was left untouched.
    UpToDate(Project),
    /// The record was updated but there is nothing to develop yet.
    NoPackages(Project),
    /// The record was updated and must be concretized again.
    Changed(Project),
}

/// Result of [`Orchestrator::concretize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Concretized {
    /// Developed packages, dependencies first.
    pub order: Vec<String>,
    /// Short specs of dependencies that still need installing.
    pub absent: Vec<String>,
}

/// Outcome of cloning one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneReport {
    pub name: String,
    pub url: String,
    pub outcome: CloneOutcome,
}

/// Options shared by build, install and test.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub parallelism: Option<usize>,
    /// Passed to the underlying generator after `--`.
    pub generator_args: Vec<String>,
}

/// What [`Orchestrator::zap`] deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZapTarget {
    #[default]
    Build,
    Install,
    All,
}

/// Validate a project name: non-empty, not hidden, path-safe.
pub fn validate_project_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("the name is empty")
    } else if name.starts_with('.') {
        Some("the name may not start with '.'")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        Some("only letters, digits, '-', '_' and '.' are allowed")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidProjectName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Delete everything inside `dir`, keeping `dir` itself.
fn remove_dir_contents(dir: &Path) -> std::result::Result<(), StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    for entry in entries {
        let path = entry.map_err(|e| StorageError::io(dir, e))?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| StorageError::io(&path, e))?;
    }
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> std::result::Result<(), StorageError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(dir, e)),
    }
}

/// Coordinates the workspace state with the external tools.
pub struct Orchestrator<'a> {
    home: MpdHome,
    store: ConfigStore,
    selector: SessionSelector,
    settings: Settings,
    tools: Tools<'a>,
}

impl<'a> Orchestrator<'a> {
    /// The selector is keyed by the session reported by `tools.processes`.
    #[must_use]
    pub fn new(home: MpdHome, settings: Settings, tools: Tools<'a>) -> Self {
        let store = home.store();
        let selector =
            SessionSelector::new(home.selections_dir(), tools.processes.current_session());
        Self {
            home,
            store,
            selector,
            settings,
            tools,
        }
    }

    #[must_use]
    pub fn home(&self) -> &MpdHome {
        &self.home
    }

    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    #[must_use]
    pub fn selector(&self) -> &SessionSelector {
        &self.selector
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(&self.home, &self.store, &self.selector, self.tools.resolver)
    }

    /// Directory of the active environment, whichever project it belongs to.
    #[must_use]
    pub fn active_environment(&self) -> Option<PathBuf> {
        self.tools.resolver.active_environment()
    }

    /// Reconcile cached state, then check the command's preconditions.
    pub fn prepare(&self, required: &[Predicate], forbidden: &[Predicate]) -> Result<ReconcileReport> {
        let report = reconcile_cache(
            &self.store,
            &self.selector,
            self.tools.resolver,
            self.tools.processes,
        )?;
        self.lifecycle().check(required, forbidden)?;
        Ok(report)
    }

    /// Create the state root and register the local package repository.
    ///
    /// Returns `false` when the state root was already initialized.
    pub fn init(&self) -> Result<bool> {
        if self.home.is_initialized() {
            warn!(root = %self.home.root().display(), "already initialized");
            return Ok(false);
        }
        self.home.initialize()?;
        self.tools
            .resolver
            .register_repository(&self.home.packages_dir())?;
        info!(root = %self.home.root().display(), "initialized");
        Ok(true)
    }

    /// Look up a project by name.
    pub fn project(&self, name: &str) -> Result<Project> {
        self.store
            .get(name)?
            .ok_or_else(|| Error::ProjectNotFound(name.to_string()))
    }

    /// Every known project, by name.
    pub fn projects(&self) -> Result<BTreeMap<String, Project>> {
        Ok(self.store.load_or_default()?.projects)
    }

    /// The project selected by this session.
    pub fn selected_project(&self) -> Result<Option<Project>> {
        Ok(self.lifecycle().selected_project()?)
    }

    /// Like [`Self::selected_project`], but a missing selection is an error.
    pub fn require_selected(&self) -> Result<Project> {
        self.selected_project()?.ok_or_else(|| {
            Error::Precondition(crate::lifecycle::PreconditionError {
                violations: vec![crate::lifecycle::Violation {
                    predicate: Predicate::ProjectSelected,
                    required: true,
                }],
            })
        })
    }

    /// Create (or with `force`, replace) a project and select it.
    ///
    /// The returned project has status `(none)`. When it has packages, the
    /// caller continues with [`Self::concretize`].
    pub fn new_project(&self, request: NewProjectRequest) -> Result<NewProject> {
        validate_project_name(&request.name)?;

        let existing = self.store.get(&request.name)?;
        let replaced = existing.is_some();
        if let Some(existing) = existing {
            if !request.force {
                return Err(Error::ProjectExists(request.name));
            }
            info!(project = %existing.name, "replacing existing project");
            self.tools.resolver.destroy_environment(&existing)?;
        }

        let source = request
            .source
            .unwrap_or_else(|| request.top.join("srcs"));
        let mut project = Project::new(&request.name, &request.top, source);
        project.envs = request.envs;
        project.cxxstd.clone_from(&self.settings.cxxstd);
        project.generator.clone_from(&self.settings.generator);
        project
            .prepare_directories()
            .map_err(|e| StorageError::io(&project.top, e))?;

        self.apply_variants(&mut project, &request.variants, &request.dependency_specs)?;
        self.store.put(&project)?;
        info!(project = %project.name, status = %project.status, "project recorded");

        let selection = self.selector.select(&project.name)?;
        Ok(NewProject {
            project,
            replaced,
            selection,
        })
    }

    /// Re-scan the source directory of the selected project and re-apply
    /// its variants.
    ///
    /// Empty `variants` or `dependency_specs` reuse the stored strings.
    pub fn refresh(&self, variants: &str, dependency_specs: &[String], force: bool) -> Result<Refresh> {
        let current = self.require_selected()?;

        let variants = if variants.trim().is_empty() {
            current.variants.clone()
        } else {
            variants.to_string()
        };
        let dependency_specs = if dependency_specs.is_empty() {
            current.dependency_specs.clone()
        } else {
            dependency_specs.to_vec()
        };

        let mut updated = current.clone();
        updated
            .prepare_directories()
            .map_err(|e| StorageError::io(&updated.top, e))?;
        self.apply_variants(&mut updated, &variants, &dependency_specs)?;

        if updated == current && !force {
            debug!(project = %current.name, "up to date");
            return Ok(Refresh::UpToDate(current));
        }

        self.store.put(&updated)?;
        if updated.has_packages() {
            Ok(Refresh::Changed(updated))
        } else {
            Ok(Refresh::NoPackages(updated))
        }
    }

    /// Discover packages and turn the raw variant strings into requirements.
    fn apply_variants(&self, project: &mut Project, variants: &str, dependency_specs: &[String]) -> Result<()> {
        let mut declared: BTreeMap<String, PackageInfo> = BTreeMap::new();
        let mut ignored = Vec::new();
        let discovered = project
            .discover_packages()
            .map_err(|e| StorageError::io(&project.source, e))?;
        for name in discovered {
            match self.tools.resolver.describe_package(&name)? {
                Some(info) => {
                    declared.insert(name, info);
                }
                None => {
                    warn!(package = %name, "not a known package; ignoring");
                    ignored.push(name);
                }
            }
        }

        let classifier = VariantClassifier::new(declared.keys().cloned().collect());
        let mut classification = classifier.classify_strs(variants, dependency_specs)?;
        let general = &mut classification.general;

        if general.remove(Variant::VERSION_KEY).is_some() {
            warn!("ignoring version in the general variants; every developed package is @develop");
        }
        let compiler = general.remove(Variant::COMPILER_KEY);
        if let Some(spec) = compiler.as_ref().and_then(Variant::compiler_spec) {
            project.compiler = Some(spec);
        }
        if let Some(cxxstd) = general.remove("cxxstd") {
            project.cxxstd = cxxstd.value().unwrap_or_default().to_string();
        }
        if let Some(generator) = general.remove("generator") {
            let value = generator.value().unwrap_or_default();
            if Generator::from_variant(value).is_none() {
                return Err(Error::UnsupportedGenerator(value.to_string()));
            }
            project.generator = value.to_string();
        }

        project.toolchain = match &project.compiler {
            Some(spec) => Some(
                self.tools
                    .resolver
                    .find_compiler(spec)?
                    .ok_or_else(|| ExternalToolError::CompilerNotFound(spec.clone()))?,
            ),
            None => None,
        };
        let compiler = compiler.or_else(|| {
            project.compiler.as_ref().map(|spec| {
                let (name, version) = match spec.split_once('@') {
                    Some((name, version)) => (name.to_string(), Some(version.to_string())),
                    None => (spec.clone(), None),
                };
                Variant::Compiler { name, version }
            })
        });

        project.packages = declared
            .iter()
            .map(|(name, info)| {
                let requirement = package_requirement(
                    project,
                    info,
                    &classification.general,
                    classification.per_package.get(name),
                    compiler.as_ref(),
                );
                (name.clone(), requirement)
            })
            .collect();
        project.dependencies = classification
            .dependency_only
            .iter()
            .map(|(name, map)| (name.clone(), PackageRequirement::from_variants(map.values())))
            .collect();
        project.virtual_providers = classification.virtual_providers;
        project.ignored = ignored;
        project.variants = variants.to_string();
        project.dependency_specs = dependency_specs.to_vec();
        Ok(())
    }

    /// Create and concretize the environment of `project`, then emit the
    /// build files.
    pub fn concretize(&self, project: &mut Project) -> Result<Concretized> {
        let resolver = self.tools.resolver;

        resolver.create_environment(project)?;
        self.set_status(project, ProjectStatus::Created)?;

        let graph = resolver.concretize(project)?;
        let developed: BTreeSet<String> = project.packages.keys().cloned().collect();
        verify_no_missing_intermediate_dependencies(&graph.direct_edges(), &developed)?;
        let ordered = order(&developed, &graph.developed_edges(&developed))?;
        debug!(order = ?ordered, "build order");

        let first_order = graph.first_order_dependencies(&developed);
        let development = resolver.develop_against(project, &first_order)?;

        let unresolved: Vec<&str> = ordered
            .iter()
            .filter(|name| graph.node(name).is_none())
            .map(String::as_str)
            .collect();
        if !unresolved.is_empty() {
            return Err(ExternalToolError::Output {
                command: "concretize".to_string(),
                reason: format!(
                    "developed packages missing from the concretized environment: {}",
                    unresolved.join(", ")
                ),
            }
            .into());
        }
        let nodes: Vec<_> = ordered.iter().filter_map(|name| graph.node(name)).collect();

        let hooks_dir = self.home.hooks_dir();
        let hooks = InstallHooks {
            spack: &self.settings.spack,
            environment: &project.name,
            dir: &hooks_dir,
        };
        write_build_files(
            &project.source,
            &project.name,
            &project.cxxstd,
            chrono::Local::now().date_naive(),
            &development.view,
            &nodes,
            &hooks,
        )?;
        self.set_status(project, ProjectStatus::Concretized)?;

        Ok(Concretized {
            order: ordered,
            absent: development.absent_dependencies(&developed),
        })
    }

    /// Install the dependencies of a concretized project.
    pub fn install_environment(&self, project: &mut Project, parallelism: Option<usize>) -> Result<()> {
        let jobs = parallelism.unwrap_or(self.settings.parallelism);
        self.tools.resolver.install(&project.local, jobs)?;
        self.set_status(project, ProjectStatus::Ready)
    }

    fn set_status(&self, project: &mut Project, status: ProjectStatus) -> Result<()> {
        project.status = status;
        self.store.put(project)?;
        info!(project = %project.name, status = %status, "status changed");
        Ok(())
    }

    /// Select `name` for this session.
    pub fn select(&self, name: &str) -> Result<SelectOutcome> {
        self.project(name)?;
        Ok(self.selector.select(name)?)
    }

    /// Name of the project whose top-level directory is `top`.
    pub fn project_at(&self, top: &Path) -> Result<String> {
        self.projects()?
            .into_values()
            .find(|project| same_directory(&project.top, top))
            .map(|project| project.name)
            .ok_or_else(|| Error::NoProjectAtDirectory(top.to_path_buf()))
    }

    /// Select the only project, if exactly one exists.
    ///
    /// `Ok(None)` means there are several to choose from.
    pub fn auto_select(&self) -> Result<Option<(String, SelectOutcome)>> {
        let projects = self.projects()?;
        let mut names = projects.keys();
        match (names.next(), names.next()) {
            (None, _) => Err(Error::NoProjects),
            (Some(name), None) => {
                let outcome = self.selector.select(name)?;
                Ok(Some((name.clone(), outcome)))
            }
            _ => Ok(None),
        }
    }

    /// Deselect the project of this session. Returns whether one was selected.
    pub fn clear(&self) -> Result<bool> {
        Ok(self.selector.deselect()?)
    }

    /// Deselect every session's project.
    pub fn clear_all(&self) -> Result<usize> {
        let cleared = self.selector.clear_all()?;
        warn!(cleared, "cleared selections of every session");
        Ok(cleared)
    }

    /// Remove a project, its environment, and its build and local areas.
    ///
    /// With `full`, the top-level directory (sources included) goes too.
    pub fn remove_project(&self, name: &str, full: bool) -> Result<Project> {
        let project = self.project(name)?;
        if self.lifecycle().environment_active_for(&project) {
            return Err(Error::EnvironmentActive(project.name));
        }

        if let Err(e) = self.tools.resolver.destroy_environment(&project) {
            warn!(project = %project.name, error = %e, "could not remove environment");
        }
        remove_dir_if_present(&project.build)?;
        remove_dir_if_present(&project.local)?;
        if full {
            remove_dir_if_present(&project.top)?;
        }

        self.store.remove(name)?;
        let deselected = self.selector.deselect_project(name)?;
        info!(project = name, deselected, full, "removed project");
        Ok(project)
    }

    /// Clone repositories, given by known name or URL, into the source
    /// directory of `project`.
    #[must_use]
    pub fn clone_repositories(&self, project: &Project, specs: &[String]) -> Vec<CloneReport> {
        let targets: BTreeMap<String, String> = specs.iter().map(|spec| repos::resolve(spec)).collect();
        self.clone_all(project, targets)
    }

    /// Clone every repository of a suite. `None` for an unknown suite.
    #[must_use]
    pub fn clone_suite(&self, project: &Project, suite: &str) -> Option<Vec<CloneReport>> {
        let suite = repos::suite(suite)?;
        Some(self.clone_all(project, suite.repositories()))
    }

    fn clone_all(&self, project: &Project, targets: BTreeMap<String, String>) -> Vec<CloneReport> {
        targets
            .into_iter()
            .map(|(name, url)| {
                let outcome = self
                    .tools
                    .source_control
                    .clone_repository(&url, &project.source.join(&name));
                debug!(repository = %name, outcome = ?outcome, "clone");
                CloneReport { name, url, outcome }
            })
            .collect()
    }

    fn configure(&self, project: &Project) -> Result<()> {
        let generator = Generator::from_variant(&project.generator)
            .ok_or_else(|| Error::UnsupportedGenerator(project.generator.clone()))?;
        let install_prefix = project.local.join("install");
        self.tools.build.configure(&ConfigureRequest {
            source: &project.source,
            build: &project.build,
            install_prefix: &install_prefix,
            generator,
            toolchain: project.toolchain.as_ref(),
        })?;
        Ok(())
    }

    /// Configure, then build the default target.
    pub fn build(&self, project: &Project, options: &BuildOptions) -> Result<()> {
        self.configure(project)?;
        self.tools.build.build(
            &project.build,
            options.parallelism,
            None,
            &options.generator_args,
        )?;
        Ok(())
    }

    /// Configure, build the `install` target, and record the install.
    pub fn install(&self, project: &mut Project, options: &BuildOptions) -> Result<InstallRecord> {
        self.configure(project)?;
        self.tools.build.build(
            &project.build,
            options.parallelism,
            Some("install"),
            &options.generator_args,
        )?;
        let record = InstallRecord {
            environment: project.local.clone(),
            at: Utc::now(),
        };
        project.installed = Some(record.clone());
        self.store.put(project)?;
        info!(project = %project.name, "install recorded");
        Ok(record)
    }

    /// Build, then run the tests.
    pub fn test(&self, project: &Project, options: &BuildOptions) -> Result<()> {
        self.build(project, options)?;
        self.tools.build.test(&project.build, options.parallelism)?;
        Ok(())
    }

    /// Delete build output and/or uninstall the developed packages.
    pub fn zap(&self, project: &Project, target: ZapTarget) -> Result<()> {
        if matches!(target, ZapTarget::Build | ZapTarget::All) {
            remove_dir_contents(&project.build)?;
        }
        if matches!(target, ZapTarget::Install | ZapTarget::All) {
            let packages: Vec<String> = project.packages.keys().cloned().collect();
            self.tools.resolver.uninstall(project, &packages)?;
        }
        Ok(())
    }
}

/// Compose the requirement of one developed package: `@develop`, the
/// project-wide settings it declares, the general variants it declares, its
/// own overrides, then the compiler.
fn package_requirement(
    project: &Project,
    info: &PackageInfo,
    general: &crate::classify::VariantMap,
    overrides: Option<&crate::classify::VariantMap>,
    compiler: Option<&Variant>,
) -> PackageRequirement {
    let mut parts = vec![Variant::Version("develop".to_string())];
    for (key, value) in [("cxxstd", &project.cxxstd), ("generator", &project.generator)] {
        if info.has_variant(key) {
            parts.push(Variant::KeyValue {
                name: key.to_string(),
                value: value.clone(),
                propagate: false,
            });
        }
    }
    parts.extend(
        general
            .values()
            .filter(|variant| info.has_variant(variant.key()))
            .cloned(),
    );
    if let Some(overrides) = overrides {
        parts.extend(overrides.values().cloned());
    }
    let overridden_compiler = overrides.is_some_and(|o| o.contains_key(Variant::COMPILER_KEY));
    if let (Some(compiler), false) = (compiler, overridden_compiler) {
        parts.push(compiler.clone());
    }
    PackageRequirement::from_variants(&parts)
}

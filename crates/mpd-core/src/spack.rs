//! [`Resolver`] implementation that drives the `spack` command line
//!
//! Spack is queried through `spack python -c <script>` whenever structured
//! data is needed; the scripts print JSON that is decoded here.

use crate::host::{
    capture, run, ExternalToolError, InstallStatus, PackageInfo, ResolvedGraph, ResolvedNode,
    Resolver,
};
use crate::project::{Project, Toolchain};
use crate::requirement::PackageRequirement;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Environment variable Spack sets for the active environment.
pub const SPACK_ENV_VAR: &str = "SPACK_ENV";

/// Name of the repository namespace created by `init`.
pub const REPOSITORY_NAMESPACE: &str = "local-mpd";

const DESCRIBE_SCRIPT: &str = r#"
import json
import spack.repo
name = __NAME__
try:
    cls = spack.repo.PATH.get_pkg_class(name)
except Exception:
    print("null")
else:
    names = cls.variant_names() if hasattr(cls, "variant_names") else cls.variants.keys()
    print(json.dumps({"name": name, "variants": sorted(set(names))}))
"#;

const GRAPH_SCRIPT: &str = r#"
import json
import spack.environment as ev
developed = set(__DEVELOPED__)
env = ev.active_environment()
nodes = []
for s in env.all_specs():
    args = []
    if s.name in developed:
        try:
            args = [str(a) for a in s.package.cmake_args()]
        except Exception:
            args = []
    if s.external:
        status = "external"
    elif s.installed:
        status = "installed"
    else:
        status = "absent"
    nodes.append({
        "name": s.name,
        "version": str(s.version),
        "hash": s.dag_hash(),
        "prefix": str(s.prefix),
        "status": status,
        "dependencies": sorted({d.name for d in s.dependencies()}),
        "cmake_args": args,
        "spec": s.cshort_spec,
    })
print(json.dumps({"view": env.view_path_default, "nodes": nodes}))
"#;

/// The `spack` executable.
#[derive(Debug, Clone)]
pub struct SpackCli {
    program: PathBuf,
}

impl SpackCli {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// `spack -e <env> ...`
    fn in_env(&self, env: impl AsRef<std::ffi::OsStr>) -> Command {
        let mut command = self.command();
        command.arg("-e").arg(env);
        command
    }

    fn named_environments(&self) -> Result<BTreeSet<String>, ExternalToolError> {
        let out = capture(self.command().args(["env", "list"]))?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    fn named_environment_path(&self, name: &str) -> Result<PathBuf, ExternalToolError> {
        let out = capture(self.command().args(["location", "-e", name]))?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Resolve a base environment given by name or directory.
    fn base_environment_path(&self, env: &str) -> Result<PathBuf, ExternalToolError> {
        let dir = Path::new(env);
        if self.is_environment(dir) {
            return Ok(dir.to_path_buf());
        }
        if self.named_environments()?.contains(env) {
            return self.named_environment_path(env);
        }
        Err(ExternalToolError::NotAnEnvironment(dir.to_path_buf()))
    }

    fn graph(&self, env: &Path, project: &Project) -> Result<ResolvedGraph, ExternalToolError> {
        let developed: Vec<&str> = project.package_names().collect();
        let script = GRAPH_SCRIPT.replace("__DEVELOPED__", &python_literal(&developed));
        let mut command = self.in_env(env);
        command.args(["python", "-c", script.as_str()]);
        let out = capture(&mut command)?;
        parse_graph(&out).map_err(|reason| ExternalToolError::Output {
            command: "spack python (graph)".to_string(),
            reason,
        })
    }

    fn write_manifest(&self, project: &Project) -> Result<PathBuf, ExternalToolError> {
        let include_concrete = project
            .envs
            .iter()
            .map(|env| self.base_environment_path(env))
            .collect::<Result<Vec<_>, _>>()?;
        let manifest = Manifest::for_project(project, include_concrete);
        let text = serde_yaml::to_string(&manifest).map_err(|e| ExternalToolError::Output {
            command: "serialize spack.yaml".to_string(),
            reason: e.to_string(),
        })?;

        let path = project.local.join(format!("{}.yaml", project.name));
        fs::write(&path, text).map_err(|e| ExternalToolError::io(&path, e))?;
        debug!(path = %path.display(), "wrote environment manifest");
        Ok(path)
    }
}

impl Default for SpackCli {
    fn default() -> Self {
        Self::new("spack")
    }
}

impl Resolver for SpackCli {
    fn describe_package(&self, name: &str) -> Result<Option<PackageInfo>, ExternalToolError> {
        let script = DESCRIBE_SCRIPT.replace("__NAME__", &python_literal(&name));
        let out = capture(self.command().args(["python", "-c", script.as_str()]))?;
        parse_package_info(&out).map_err(|e| ExternalToolError::Output {
            command: format!("spack python (describe {name})"),
            reason: e.to_string(),
        })
    }

    fn find_compiler(&self, spec: &str) -> Result<Option<Toolchain>, ExternalToolError> {
        match capture(self.command().args(["compiler", "info", spec])) {
            Ok(out) => Ok(parse_compiler_info(&out)),
            Err(ExternalToolError::Failed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_environment(&self, dir: &Path) -> bool {
        dir.join("spack.yaml").is_file()
    }

    fn active_environment(&self) -> Option<PathBuf> {
        std::env::var_os(SPACK_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn create_environment(&self, project: &Project) -> Result<(), ExternalToolError> {
        let manifest = self.write_manifest(project)?;
        if self.named_environments()?.contains(&project.name) {
            run(self.command().args(["env", "rm", "-y", project.name.as_str()]))?;
        }
        run(self
            .command()
            .args(["env", "create", project.name.as_str()])
            .arg(&manifest))?;
        info!(project = %project.name, "created environment");
        Ok(())
    }

    fn concretize(&self, project: &Project) -> Result<ResolvedGraph, ExternalToolError> {
        let env = self.named_environment_path(&project.name)?;
        run(self.in_env(&env).args(["concretize", "-f"]))?;
        self.graph(&env, project)
    }

    fn develop_against(
        &self,
        project: &Project,
        first_order: &BTreeSet<String>,
    ) -> Result<ResolvedGraph, ExternalToolError> {
        let lockfile = self.named_environment_path(&project.name)?.join("spack.lock");
        clear_environment_dir(&project.local)?;
        run(self
            .command()
            .args(["env", "create", "-d"])
            .arg(&project.local)
            .arg(&lockfile))?;

        if !first_order.is_empty() {
            run(self.in_env(&project.local).arg("add").args(first_order))?;
        }
        run(self
            .in_env(&project.local)
            .arg("rm")
            .args(project.package_names()))?;
        run(self.in_env(&project.local).arg("concretize"))?;

        self.graph(&project.local, project)
    }

    fn install(&self, env: &Path, parallelism: usize) -> Result<(), ExternalToolError> {
        let spack = shell_quote(&self.program.to_string_lossy());
        let script = format!(
            "eval \"$({spack} env activate --sh {env})\" && {spack} install -j{parallelism}",
            env = shell_quote(&env.to_string_lossy()),
        );
        run(Command::new("sh").args(["-c", &script]))
    }

    fn uninstall(&self, project: &Project, packages: &[String]) -> Result<(), ExternalToolError> {
        let env = self.named_environment_path(&project.name)?;
        let graph = self.graph(&env, project)?;
        let hashes: Vec<String> = packages
            .iter()
            .filter_map(|name| graph.node(name))
            .filter(|node| node.status == InstallStatus::Installed)
            .map(|node| format!("/{}", node.hash))
            .collect();
        if hashes.is_empty() {
            return Ok(());
        }
        run(self.command().args(["uninstall", "-y", "-f"]).args(&hashes))
    }

    fn destroy_environment(&self, project: &Project) -> Result<(), ExternalToolError> {
        if self.named_environments()?.contains(&project.name) {
            run(self.command().args(["env", "rm", "-y", project.name.as_str()]))?;
        }
        clear_environment_dir(&project.local)
    }

    fn register_repository(&self, dir: &Path) -> Result<(), ExternalToolError> {
        let repo = dir.join(REPOSITORY_NAMESPACE);
        if !repo.join("repo.yaml").is_file() {
            run(self
                .command()
                .args(["repo", "create"])
                .arg(dir)
                .arg(REPOSITORY_NAMESPACE))?;
        }
        let registered = capture(self.command().args(["repo", "list"]))?;
        if !registered.contains(&*repo.to_string_lossy()) {
            run(self
                .command()
                .args(["repo", "add", "--scope", "user"])
                .arg(&repo))?;
        }
        Ok(())
    }
}

/// The `spack.yaml` written for a project.
#[derive(Debug, Serialize)]
struct Manifest {
    spack: EnvironmentBlock,
}

#[derive(Debug, Serialize)]
struct EnvironmentBlock {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_concrete: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    definitions: Vec<BTreeMap<String, Vec<String>>>,
    specs: Vec<String>,
    concretizer: Concretizer,
    packages: BTreeMap<String, PackageEntry>,
}

#[derive(Debug, Serialize)]
struct Concretizer {
    unify: bool,
    reuse: Reuse,
}

#[derive(Debug, Serialize)]
struct Reuse {
    from: Vec<ReuseSource>,
}

#[derive(Debug, Serialize)]
struct ReuseSource {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Default, Serialize)]
struct PackageEntry {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    require: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    providers: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    fn for_project(project: &Project, include_concrete: Vec<PathBuf>) -> Self {
        let entry = |requirement: &PackageRequirement| PackageEntry {
            require: requirement.require.clone(),
            providers: BTreeMap::new(),
        };
        let mut packages: BTreeMap<String, PackageEntry> = project
            .dependencies
            .iter()
            .chain(&project.packages)
            .map(|(name, requirement)| (name.clone(), entry(requirement)))
            .collect();
        if !project.virtual_providers.is_empty() {
            packages.entry("all".to_string()).or_default().providers =
                project.virtual_providers.clone();
        }

        let definitions = project
            .compiler
            .iter()
            .map(|compiler| BTreeMap::from([("compiler".to_string(), vec![compiler.clone()])]))
            .collect();

        Self {
            spack: EnvironmentBlock {
                include_concrete,
                definitions,
                specs: project.package_names().map(str::to_string).collect(),
                concretizer: Concretizer {
                    unify: true,
                    reuse: Reuse {
                        from: vec![ReuseSource { kind: "local" }, ReuseSource { kind: "external" }],
                    },
                },
                packages,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphReport {
    view: PathBuf,
    nodes: Vec<NodeReport>,
}

#[derive(Debug, Deserialize)]
struct NodeReport {
    name: String,
    version: String,
    hash: String,
    prefix: PathBuf,
    status: String,
    dependencies: BTreeSet<String>,
    #[serde(default)]
    cmake_args: Vec<String>,
    spec: String,
}

fn parse_graph(json: &str) -> Result<ResolvedGraph, String> {
    let report: GraphReport = serde_json::from_str(json.trim()).map_err(|e| e.to_string())?;
    let mut graph = ResolvedGraph {
        nodes: BTreeMap::new(),
        view: report.view,
    };
    for node in report.nodes {
        let status = match node.status.as_str() {
            "installed" => InstallStatus::Installed,
            "external" => InstallStatus::External,
            _ => InstallStatus::Absent,
        };
        graph.insert(ResolvedNode {
            name: node.name,
            version: node.version,
            hash: node.hash,
            prefix: node.prefix,
            status,
            dependencies: node.dependencies,
            cmake_args: node.cmake_args,
            spec: node.spec,
        });
    }
    Ok(graph)
}

/// Extract C and C++ compiler paths from `spack compiler info` output.
/// Output of the describe script: `null` or `{"name": ..., "variants": [...]}`.
fn parse_package_info(text: &str) -> Result<Option<PackageInfo>, serde_json::Error> {
    serde_json::from_str(text.trim())
}

fn parse_compiler_info(text: &str) -> Option<Toolchain> {
    let c = Regex::new(r"(?m)^\s*(?:cc|c)\s*[=:]\s*(\S+)").ok()?;
    let cxx = Regex::new(r"(?m)^\s*(?:cxx|c\+\+)\s*[=:]\s*(\S+)").ok()?;
    let path = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| PathBuf::from(m.as_str()))
            .filter(|p| p.as_os_str() != "None")
    };
    Some(Toolchain {
        c: path(&c)?,
        cxx: path(&cxx)?,
    })
}

/// Remove the environment files in `dir`, keeping everything else.
fn clear_environment_dir(dir: &Path) -> Result<(), ExternalToolError> {
    for file in ["spack.yaml", "spack.lock"] {
        let path = dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ExternalToolError::io(path, e)),
        }
    }
    let hidden = dir.join(".spack-env");
    match fs::remove_dir_all(&hidden) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExternalToolError::io(hidden, e)),
    }
}

/// A Python literal for a string or list of strings (JSON is a subset).
fn python_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "None".to_string())
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_compiler_info() {
        let text = "gcc@=13.1.0:\n\tpaths:\n\t\tcc = /usr/bin/gcc\n\t\tcxx = /usr/bin/g++\n\t\tf77 = None\n";
        let toolchain = parse_compiler_info(text).unwrap();
        assert_eq!(toolchain.c, PathBuf::from("/usr/bin/gcc"));
        assert_eq!(toolchain.cxx, PathBuf::from("/usr/bin/g++"));

        let newer = "gcc@13.1.0\n  compilers:\n    c: /opt/gcc/bin/gcc\n    cxx: /opt/gcc/bin/g++\n";
        assert_eq!(
            parse_compiler_info(newer).unwrap().c,
            PathBuf::from("/opt/gcc/bin/gcc")
        );
        assert!(parse_compiler_info("nothing here").is_none());
    }

    #[test]
    fn test_parse_package_info() {
        assert_eq!(parse_package_info("null\n").unwrap(), None);
        let info = parse_package_info(r#"{"name": "art", "variants": ["cxxstd", "generator"]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(info.name, "art");
        assert!(info.has_variant("cxxstd"));
        assert!(!info.has_variant("debug"));
        assert!(parse_package_info("not json").is_err());
    }

    #[test]
    fn test_parse_graph() {
        let json = r#"{"view": "/env/.spack-env/view", "nodes": [
            {"name": "art", "version": "develop", "hash": "abc", "prefix": "/store/art",
             "status": "absent", "dependencies": ["root"],
             "cmake_args": ["-DART_X:BOOL=ON"], "spec": "art@develop"},
            {"name": "root", "version": "6.30", "hash": "def", "prefix": "/store/root",
             "status": "installed", "dependencies": [], "spec": "root@6.30"}
        ]}"#;
        let graph = parse_graph(json).unwrap();
        assert_eq!(graph.view, PathBuf::from("/env/.spack-env/view"));
        assert_eq!(graph.node("root").unwrap().status, InstallStatus::Installed);
        assert_eq!(graph.node("art").unwrap().cmake_args, vec!["-DART_X:BOOL=ON"]);
        assert!(parse_graph("not json").is_err());
    }

    #[test]
    fn test_manifest_yaml() {
        let mut project = Project::new("demo", "/work/demo", "/work/demo/srcs");
        project.compiler = Some("gcc@13".to_string());
        project.packages.insert(
            "art".to_string(),
            PackageRequirement {
                require: vec!["@develop".to_string(), "%gcc@13".to_string()],
            },
        );
        project.dependencies.insert(
            "root".to_string(),
            PackageRequirement {
                require: vec!["+x11".to_string()],
            },
        );
        project
            .virtual_providers
            .insert("mpi".to_string(), vec!["openmpi".to_string()]);

        let manifest = Manifest::for_project(&project, Vec::new());
        let value: serde_yaml::Value =
            serde_yaml::from_str(&serde_yaml::to_string(&manifest).unwrap()).unwrap();

        assert_eq!(value["spack"]["specs"][0], "art");
        assert_eq!(value["spack"]["packages"]["art"]["require"][1], "%gcc@13");
        assert_eq!(value["spack"]["packages"]["root"]["require"][0], "+x11");
        assert_eq!(value["spack"]["packages"]["all"]["providers"]["mpi"][0], "openmpi");
        assert_eq!(value["spack"]["definitions"][0]["compiler"][0], "gcc@13");
        assert_eq!(value["spack"]["concretizer"]["reuse"]["from"][1]["type"], "external");
        assert!(value["spack"].get("include_concrete").is_none());
    }

    #[test]
    fn test_clear_environment_dir_keeps_other_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("spack.yaml"), "spack: {}").unwrap();
        fs::write(temp.path().join("demo.yaml"), "spack: {}").unwrap();
        fs::create_dir(temp.path().join(".spack-env")).unwrap();

        clear_environment_dir(temp.path()).unwrap();
        clear_environment_dir(temp.path()).unwrap();
        assert!(!temp.path().join("spack.yaml").exists());
        assert!(!temp.path().join(".spack-env").exists());
        assert!(temp.path().join("demo.yaml").exists());
    }

    #[test]
    fn test_python_literal_and_quote() {
        assert_eq!(python_literal("art"), r#""art""#);
        assert_eq!(python_literal(&["a", "b"]), r#"["a","b"]"#);
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_is_environment() {
        let temp = TempDir::new().unwrap();
        let spack = SpackCli::default();
        assert!(!spack.is_environment(temp.path()));
        fs::write(temp.path().join("spack.yaml"), "spack: {}").unwrap();
        assert!(spack.is_environment(temp.path()));
    }
}

//! Generated CMake files at the top of the source directory
//!
//! - `develop.cmake`: per-package cache-variable macros and `develop(pkg)`
//! - `CMakeLists.txt`: one `develop(pkg)` per package, dependencies first
//! - `CMakePresets.json`: the `default` configure preset
//!
//! Installing a developed package goes straight into its store prefix, so
//! `develop(pkg)` brackets the install with two Spack scripts: one creates
//! the prefix, the other records the package as installed in Spack's
//! database. Uninstalling through Spack then finds it.

use crate::host::ResolvedNode;
use crate::store::{write_atomic, StorageError};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Name of the preset each package may ship with its own cache variables.
const PACKAGE_PRESET: &str = "from_product_deps";

const ENSURE_PREFIX_HOOK: &str = "ensure-install-prefix.py";
const REGISTER_HOOK: &str = "register-install.py";

const ENSURE_PREFIX_SCRIPT: &str = r#"import os
import sys

import spack.environment as ev
import spack.store

spec = ev.active_environment().get_one_by_hash(sys.argv[1])
layout = spack.store.STORE.layout
if not os.path.exists(layout.metadata_path(spec)):
    layout.create_install_directory(spec)
"#;

const REGISTER_SCRIPT: &str = r#"import sys

import spack.environment as ev
import spack.store

spec = ev.active_environment().get_one_by_hash(sys.argv[1])
spack.store.STORE.db.add(spec)
"#;

/// How the install-time hooks reach Spack.
#[derive(Debug, Clone, Copy)]
pub struct InstallHooks<'a> {
    /// The `spack` executable.
    pub spack: &'a Path,
    /// Environment (name or directory) whose concretized specs carry the hashes.
    pub environment: &'a str,
    /// Where the hook scripts are written.
    pub dir: &'a Path,
}

impl InstallHooks<'_> {
    /// Write both hook scripts into `dir`.
    pub fn write_scripts(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.dir).map_err(|e| StorageError::io(self.dir, e))?;
        write_atomic(&self.dir.join(ENSURE_PREFIX_HOOK), ENSURE_PREFIX_SCRIPT.as_bytes())?;
        write_atomic(&self.dir.join(REGISTER_HOOK), REGISTER_SCRIPT.as_bytes())
    }
}

fn cmake_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn macro_suffix(name: &str) -> String {
    name.replace('-', "_")
}

/// `set_<pkg>_variables` / `unset_<pkg>_variables` macros for one package.
///
/// Only arguments of the form `-DNAME:TYPE=VALUE` are carried over.
#[must_use]
pub fn package_variable_macros(name: &str, cmake_args: &[String]) -> String {
    let Ok(pattern) = Regex::new(r"^-D([^:=]+):([^=]+)=(.*)$") else {
        return String::new();
    };
    let suffix = macro_suffix(name);
    let mut set = format!("macro(set_{suffix}_variables)\n");
    let mut unset = format!("macro(unset_{suffix}_variables)\n");

    for arg in cmake_args {
        let Some(caps) = pattern.captures(arg) else {
            continue;
        };
        let (variable, kind, value) = (&caps[1], &caps[2], &caps[3]);
        let _ = write!(
            set,
            "  # Set {variable}\n  if(DEFINED {variable})\n    set(OLD_{variable} \"${{{variable}}}\")\n  endif()\n  set({variable} \"{value}\" CACHE {kind} \"\" FORCE)\n"
        );
        let _ = write!(
            unset,
            "  # Restore/unset {variable}\n  if(DEFINED OLD_{variable})\n    set({variable} \"${{OLD_{variable}}}\" CACHE {kind} \"\" FORCE)\n    unset(OLD_{variable})\n  else()\n    unset({variable} CACHE)\n  endif()\n"
        );
    }

    set.push_str("endmacro()\n\n");
    unset.push_str("endmacro()\n\n");
    set + &unset
}

/// Contents of `develop.cmake`.
#[must_use]
pub fn develop_cmake(packages: &[&ResolvedNode], hooks: &InstallHooks<'_>) -> String {
    let mut out = String::new();
    for node in packages {
        let _ = write!(
            out,
            "# {} variables\n{}",
            node.name,
            package_variable_macros(&node.name, &node.cmake_args)
        );
    }
    let _ = write!(
        out,
        "set(MPD_SPACK \"{}\")\nset(MPD_ENVIRONMENT \"{}\")\nset(MPD_HOOKS \"{}\")\n",
        cmake_path(hooks.spack),
        hooks.environment,
        cmake_path(hooks.dir)
    );
    let _ = write!(
        out,
        r#"macro(develop pkg)
  install(CODE "execute_process(COMMAND \"${{MPD_SPACK}}\" -e \"${{MPD_ENVIRONMENT}}\" python \"${{MPD_HOOKS}}/{ENSURE_PREFIX_HOOK}\" ${{${{pkg}}_HASH}})")
  install(CODE "set(CMAKE_INSTALL_PREFIX ${{${{pkg}}_INSTALL_PREFIX}})")
  string(REPLACE "-" "_" pkg_with_underscores ${{pkg}})
  cmake_language(CALL "set_${{pkg_with_underscores}}_variables")
  add_subdirectory(${{pkg}})
  cmake_language(CALL "unset_${{pkg_with_underscores}}_variables")
  install(CODE "execute_process(COMMAND \"${{MPD_SPACK}}\" -e \"${{MPD_ENVIRONMENT}}\" python \"${{MPD_HOOKS}}/{REGISTER_HOOK}\" ${{${{pkg}}_HASH}})")
endmacro()
"#
    );
    out
}

/// Contents of `CMakeLists.txt`.
///
/// `order` lists dependencies before dependents and is emitted unchanged:
/// `add_subdirectory` must see a package before anything that finds it.
#[must_use]
pub fn cmake_lists(project_name: &str, date: NaiveDate, order: &[&str]) -> String {
    let mut out = format!(
        "cmake_minimum_required(VERSION 3.18.2 FATAL_ERROR)\nenable_testing()\n\nproject({project_name}-{} LANGUAGES NONE)\n\ninclude(develop.cmake)\n",
        date.format("%Y-%m-%d")
    );
    for name in order {
        let _ = write!(out, "\ndevelop({name})");
    }
    out.push('\n');
    out
}

fn typed(kind: &str, value: impl Into<Value>) -> Value {
    json!({ "type": kind, "value": value.into() })
}

/// Cache variables a package declares for itself in its own presets file.
fn package_preset_variables(source: &Path, name: &str) -> Map<String, Value> {
    let path = source.join(name).join("CMakePresets.json");
    let Ok(text) = fs::read_to_string(&path) else {
        return Map::new();
    };
    let presets: Value = match serde_json::from_str(&text) {
        Ok(presets) => presets,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable presets file");
            return Map::new();
        }
    };

    presets["configurePresets"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|preset| preset["name"] == PACKAGE_PRESET)
        .and_then(|preset| preset["cacheVariables"].as_object())
        .map(|vars| {
            vars.iter()
                .filter(|(key, _)| key.starts_with(name))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Contents of `CMakePresets.json` as a JSON value.
#[must_use]
pub fn cmake_presets(source: &Path, cxxstd: &str, view: &Path, packages: &[&ResolvedNode]) -> Value {
    let rpath: Vec<String> = ["lib", "lib64"]
        .iter()
        .map(|dir| view.join(dir).to_string_lossy().into_owned())
        .collect();

    let mut cache = Map::new();
    cache.insert("CMAKE_BUILD_TYPE".into(), typed("STRING", "RelWithDebInfo"));
    cache.insert("CMAKE_CXX_EXTENSIONS".into(), typed("BOOL", "OFF"));
    cache.insert("CMAKE_CXX_STANDARD_REQUIRED".into(), typed("BOOL", "ON"));
    cache.insert("CMAKE_CXX_STANDARD".into(), typed("STRING", cxxstd));
    cache.insert("CMAKE_INSTALL_RPATH_USE_LINK_PATH".into(), typed("BOOL", "ON"));
    cache.insert("CMAKE_INSTALL_RPATH".into(), typed("STRING", rpath.join(";")));

    for node in packages {
        cache.insert(format!("{}_HASH", node.name), node.hash.clone().into());
        cache.insert(
            format!("{}_INSTALL_PREFIX", node.name),
            node.prefix.to_string_lossy().into_owned().into(),
        );
        cache.extend(package_preset_variables(source, &node.name));
    }

    json!({
        "configurePresets": [{
            "cacheVariables": cache,
            "description": "Configuration settings as created by 'mpd new-project'",
            "displayName": "Configuration from mpd new-project",
            "name": "default",
        }],
        "version": 3,
    })
}

/// Write all three files into `source`, and the hook scripts they call.
pub fn write_build_files(
    source: &Path,
    project_name: &str,
    cxxstd: &str,
    date: NaiveDate,
    view: &Path,
    ordered: &[&ResolvedNode],
    hooks: &InstallHooks<'_>,
) -> Result<(), StorageError> {
    let names: Vec<&str> = ordered.iter().map(|node| node.name.as_str()).collect();
    let presets_path = source.join("CMakePresets.json");
    let presets = cmake_presets(source, cxxstd, view, ordered);
    let presets = serde_json::to_string_pretty(&presets).map_err(|e| StorageError::Encode {
        path: presets_path.clone(),
        source: e,
    })?;

    hooks.write_scripts()?;
    write_atomic(&source.join("develop.cmake"), develop_cmake(ordered, hooks).as_bytes())?;
    write_atomic(
        &source.join("CMakeLists.txt"),
        cmake_lists(project_name, date, &names).as_bytes(),
    )?;
    write_atomic(&presets_path, presets.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn node(name: &str, args: &[&str]) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            hash: format!("{name}hash"),
            prefix: PathBuf::from(format!("/store/{name}")),
            cmake_args: args.iter().map(|a| (*a).to_string()).collect(),
            ..ResolvedNode::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_cmake_lists_keeps_dependency_order() {
        let text = cmake_lists("demo", date(), &["foo", "bar"]);
        assert!(text.contains("project(demo-2024-05-01 LANGUAGES NONE)"));
        let foo = text.find("develop(foo)").unwrap();
        let bar = text.find("develop(bar)").unwrap();
        assert!(foo < bar);
        assert!(text.ends_with("develop(bar)\n"));
    }

    #[test]
    fn test_variable_macros() {
        let text = package_variable_macros(
            "art-root-io",
            &["-DART_X:BOOL=ON".to_string(), "--not-a-define".to_string()],
        );
        assert!(text.starts_with("macro(set_art_root_io_variables)\n"));
        assert!(text.contains("  set(ART_X \"ON\" CACHE BOOL \"\" FORCE)\n"));
        assert!(text.contains("macro(unset_art_root_io_variables)\n"));
        assert!(text.contains("    unset(ART_X CACHE)\n"));
        assert!(!text.contains("not-a-define"));
    }

    fn hooks(dir: &Path) -> InstallHooks<'_> {
        InstallHooks {
            spack: Path::new("/opt/spack/bin/spack"),
            environment: "demo",
            dir,
        }
    }

    #[test]
    fn test_develop_macro_present() {
        let art = node("art", &[]);
        let text = develop_cmake(&[&art], &hooks(Path::new("/home/u/.mpd/hooks")));
        assert!(text.starts_with("# art variables\nmacro(set_art_variables)"));
        assert!(text.contains("macro(develop pkg)"));
        assert!(text.contains("add_subdirectory(${pkg})"));
        assert!(text.contains("set(MPD_SPACK \"/opt/spack/bin/spack\")\n"));
        assert!(text.contains("set(MPD_ENVIRONMENT \"demo\")\n"));
        assert!(text.contains("set(MPD_HOOKS \"/home/u/.mpd/hooks\")\n"));
    }

    #[test]
    fn test_install_is_bracketed_by_hooks() {
        let art = node("art", &[]);
        let text = develop_cmake(&[&art], &hooks(Path::new("/hooks")));
        let ensure = text.find("${MPD_HOOKS}/ensure-install-prefix.py\\\" ${${pkg}_HASH}").unwrap();
        let prefix = text.find("set(CMAKE_INSTALL_PREFIX ${${pkg}_INSTALL_PREFIX})").unwrap();
        let subdir = text.find("add_subdirectory(${pkg})").unwrap();
        let register = text.find("${MPD_HOOKS}/register-install.py\\\" ${${pkg}_HASH}").unwrap();
        assert!(ensure < prefix && prefix < subdir && subdir < register);
        assert!(text.contains("execute_process(COMMAND \\\"${MPD_SPACK}\\\" -e \\\"${MPD_ENVIRONMENT}\\\" python"));
    }

    #[test]
    fn test_presets_merge_package_variables() {
        let temp = TempDir::new().unwrap();
        let art_dir = temp.path().join("art");
        fs::create_dir(&art_dir).unwrap();
        fs::write(
            art_dir.join("CMakePresets.json"),
            r#"{"configurePresets": [{"name": "from_product_deps",
                "cacheVariables": {"art_FOO": "1", "OTHER": "2"}}]}"#,
        )
        .unwrap();

        let art = node("art", &[]);
        let presets = cmake_presets(temp.path(), "20", Path::new("/view"), &[&art]);
        let cache = &presets["configurePresets"][0]["cacheVariables"];

        assert_eq!(presets["version"], 3);
        assert_eq!(cache["CMAKE_CXX_STANDARD"]["value"], "20");
        assert_eq!(cache["CMAKE_INSTALL_RPATH"]["value"], "/view/lib;/view/lib64");
        assert_eq!(cache["art_HASH"], "arthash");
        assert_eq!(cache["art_INSTALL_PREFIX"], "/store/art");
        assert_eq!(cache["art_FOO"], "1");
        assert!(cache.get("OTHER").is_none());
    }

    #[test]
    fn test_write_build_files() {
        let temp = TempDir::new().unwrap();
        let foo = node("foo", &[]);
        let bar = node("bar", &[]);
        let hook_dir = temp.path().join("home/hooks");
        write_build_files(
            temp.path(),
            "demo",
            "17",
            date(),
            Path::new("/view"),
            &[&foo, &bar],
            &hooks(&hook_dir),
        )
        .unwrap();

        for file in ["develop.cmake", "CMakeLists.txt", "CMakePresets.json"] {
            assert!(temp.path().join(file).is_file(), "{file} missing");
        }
        let register = fs::read_to_string(hook_dir.join("register-install.py")).unwrap();
        assert!(register.contains("spack.store.STORE.db.add(spec)"));
        let ensure = fs::read_to_string(hook_dir.join("ensure-install-prefix.py")).unwrap();
        assert!(ensure.contains("create_install_directory(spec)"));
        let presets: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("CMakePresets.json")).unwrap())
                .unwrap();
        assert_eq!(presets["configurePresets"][0]["name"], "default");
    }
}

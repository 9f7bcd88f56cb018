//! Implementation of the `mpd new-project` command.

use anyhow::{bail, Context, Result};
use mpd_core::orchestrate::NewProjectRequest;
use mpd_core::{Orchestrator, Predicate};
use std::path::PathBuf;

use crate::{concretize, display};

/// Options for creating a project.
#[derive(Debug)]
pub struct NewProjectOptions {
    pub name: Option<String>,
    pub top: Option<PathBuf>,
    pub srcs: Option<PathBuf>,
    pub force: bool,
    pub envs: Vec<String>,
    pub dependencies: Vec<String>,
    pub yes: bool,
    pub variants: Vec<String>,
}

/// The project name: `--name`, else the last component of `--top`.
fn project_name(name: Option<String>, top: Option<&PathBuf>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    let Some(top) = top else {
        bail!("--name is required when --top is not specified");
    };
    top.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("cannot derive a project name from '{}'", top.display()))
}

pub fn new_project(mpd: &Orchestrator<'_>, options: NewProjectOptions) -> Result<()> {
    mpd.prepare(
        &[Predicate::Initialized],
        &[Predicate::EnvironmentActiveForSelectedProject],
    )?;

    let name = project_name(options.name, options.top.as_ref())?;
    let top = match options.top {
        Some(top) => top,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    println!("\n==> Creating project: {name}");
    let created = mpd.new_project(NewProjectRequest {
        name,
        top,
        source: options.srcs,
        envs: options.envs,
        variants: options.variants.join(" "),
        dependency_specs: options.dependencies,
        force: options.force,
    })?;
    if created.replaced {
        println!("==> Overwrote existing MPD project {}", created.project.name);
    }

    display::print_config_info(&created.project);
    display::print_selection(&created.project.name, &created.selection);

    if created.project.has_packages() {
        concretize::concretize_and_install(mpd, created.project, options.yes)
    } else {
        display::print_clone_hint();
        Ok(())
    }
}

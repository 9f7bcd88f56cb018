//! Implementation of the `mpd refresh` command.

use anyhow::Result;
use mpd_core::orchestrate::Refresh;
use mpd_core::{Orchestrator, Predicate};

use crate::{concretize, display};

/// Options for refreshing the selected project.
#[derive(Debug)]
pub struct RefreshOptions {
    pub force: bool,
    pub dependencies: Vec<String>,
    pub yes: bool,
    pub variants: Vec<String>,
}

pub fn refresh(mpd: &Orchestrator<'_>, options: &RefreshOptions) -> Result<()> {
    mpd.prepare(
        &[Predicate::Initialized, Predicate::ProjectSelected],
        &[Predicate::EnvironmentActiveForSelectedProject],
    )?;

    match mpd.refresh(&options.variants.join(" "), &options.dependencies, options.force)? {
        Refresh::UpToDate(project) => {
            println!("==> Project {} is up-to-date", project.name);
        }
        Refresh::NoPackages(project) => {
            println!("\n==> Refreshing project: {}", project.name);
            display::print_config_info(&project);
            display::print_clone_hint();
        }
        Refresh::Changed(project) => {
            println!("\n==> Refreshing project: {}", project.name);
            display::print_config_info(&project);
            concretize::concretize_and_install(mpd, project, options.yes)?;
        }
    }
    Ok(())
}

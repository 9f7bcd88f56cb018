//! Implementation of the `mpd select` and `mpd clear` commands.

use anyhow::{bail, Result};
use mpd_core::{Orchestrator, Predicate};
use std::path::PathBuf;

use crate::{display, prompt};

/// Select a project by name, by top-level directory, or (with neither) the
/// only existing project. With several candidates the user picks one.
pub fn select(mpd: &Orchestrator<'_>, directory: Option<PathBuf>, project: Option<String>) -> Result<()> {
    mpd.prepare(
        &[Predicate::Initialized],
        &[Predicate::EnvironmentActiveForSelectedProject],
    )?;

    let name = match (project, directory) {
        (Some(name), _) => name,
        (None, Some(directory)) => mpd.project_at(&directory)?,
        (None, None) => {
            if let Some((name, outcome)) = mpd.auto_select()? {
                display::print_selection(&name, &outcome);
                return Ok(());
            }
            let names: Vec<String> = mpd.projects()?.into_keys().collect();
            match prompt::choose("Multiple projects exist:", &names) {
                Some(name) => name,
                None => bail!("No project selected"),
            }
        }
    };

    let outcome = mpd.select(&name)?;
    display::print_selection(&name, &outcome);
    Ok(())
}

/// Deselect the project of this shell, or of every shell with `all`.
pub fn clear(mpd: &Orchestrator<'_>, all: bool) -> Result<()> {
    mpd.prepare(
        &[Predicate::Initialized],
        &[Predicate::EnvironmentActiveForSelectedProject],
    )?;

    if all {
        let cleared = mpd.clear_all()?;
        eprintln!(
            "Warning: Cleared the selected project of every shell ({cleared} selection(s)); \
             other shells must select a project again"
        );
        return Ok(());
    }

    let selected = mpd.selected_project()?;
    mpd.clear()?;
    match selected {
        Some(project) => println!("==> Cleared selected project {}", project.name),
        None => println!("==> No project selected"),
    }
    Ok(())
}

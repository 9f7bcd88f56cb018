//! Implementation of the `mpd list` and `mpd status` commands.

use anyhow::{Context, Result};
use mpd_core::project::same_directory;
use mpd_core::{Orchestrator, Predicate, Project};

const NONE: &str = "(none)";

pub fn list(mpd: &Orchestrator<'_>, names: &[String], top: Option<&str>) -> Result<()> {
    mpd.prepare(&[Predicate::Initialized], &[])?;

    if let Some(name) = top {
        println!("{}", mpd.project(name)?.top.display());
        return Ok(());
    }

    if !names.is_empty() {
        for name in names {
            let project = mpd.project(name)?;
            let details = toml::to_string_pretty(&project)
                .with_context(|| format!("failed to format project {name}"))?;
            println!("\nDetails for {name}\n\n{details}");
        }
        return Ok(());
    }

    let projects = mpd.projects()?;
    if projects.is_empty() {
        println!("No existing MPD projects.");
        return Ok(());
    }

    let selected = mpd.selected_project()?.map(|project| project.name);
    let shared = mpd.selector().all_selections()?;
    let lifecycle = mpd.lifecycle();

    let width = projects.keys().map(String::len).max().unwrap_or(0).max("Project".len());
    println!("\nExisting MPD projects:\n");
    println!("    {:<width$}  Status", "Project");
    println!("    {}", "-".repeat(width + 8));
    for (name, project) in &projects {
        let is_selected = selected.as_deref() == Some(name.as_str());
        let status = if lifecycle.environment_active_for(project) {
            "active".to_string()
        } else {
            project.status.to_string()
        };
        let (left, right) = if is_selected { ("▶", "◀") } else { (" ", "") };
        let mut line = format!("  {left} {name:<width$}  {status}");
        if shared.get(name).is_some_and(|sessions| sessions.len() > 1) {
            line.push_str("  (Warning: used by more than one shell)");
        }
        println!("{line} {right}");
    }
    if selected.is_some() {
        println!("\n  ▶ selected project");
    }
    println!();
    Ok(())
}

pub fn status(mpd: &Orchestrator<'_>) -> Result<()> {
    mpd.prepare(&[Predicate::Initialized], &[])?;

    let Some(project) = mpd.selected_project()? else {
        println!("==> No selected project");
        warn_foreign_environment(mpd, None);
        return Ok(());
    };

    print_status(&project);
    warn_foreign_environment(mpd, Some(&project));
    Ok(())
}

fn print_status(project: &Project) {
    let installed = project
        .installed
        .as_ref()
        .map_or_else(|| NONE.to_string(), |record| record.at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    println!("\n==> Selected project:   {}\n", project.name);
    println!("    Source directory:   {}", project.source.display());
    println!("    Build directory:    {}", project.build.display());
    println!("    Local directory:    {}", project.local.display());
    println!("    Development status: {}", project.status);
    println!("    Last installed:     {installed}\n");
}

/// Warn when the active environment is not the selected project's.
fn warn_foreign_environment(mpd: &Orchestrator<'_>, project: Option<&Project>) {
    let Some(active) = mpd.active_environment() else {
        return;
    };
    if project.is_some_and(|project| same_directory(&project.local, &active)) {
        return;
    }
    eprintln!(
        "Warning: An environment that is not the selected project's is active ({})",
        active.display()
    );
}

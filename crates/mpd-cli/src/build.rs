//! Implementation of the `mpd build`, `mpd install`, `mpd test` and
//! `mpd zap` commands.

use anyhow::Result;
use mpd_core::orchestrate::{BuildOptions, ZapTarget};
use mpd_core::{Orchestrator, Predicate, Project};

const BUILD_PRECONDITIONS: [Predicate; 3] = [
    Predicate::Initialized,
    Predicate::ProjectSelected,
    Predicate::PackagesPresent,
];

fn selected_for_build(mpd: &Orchestrator<'_>) -> Result<Project> {
    mpd.prepare(&BUILD_PRECONDITIONS, &[])?;
    Ok(mpd.require_selected()?)
}

pub fn build(mpd: &Orchestrator<'_>, options: &BuildOptions) -> Result<()> {
    let project = selected_for_build(mpd)?;
    println!("==> Building {}", project.name);
    mpd.build(&project, options)?;
    println!("==> Build of {} complete", project.name);
    Ok(())
}

pub fn install(mpd: &Orchestrator<'_>, options: &BuildOptions) -> Result<()> {
    let mut project = selected_for_build(mpd)?;
    println!("==> Installing {}", project.name);
    mpd.install(&mut project, options)?;
    println!("==> Installed developed packages of {}", project.name);
    Ok(())
}

pub fn test(mpd: &Orchestrator<'_>, options: &BuildOptions) -> Result<()> {
    let project = selected_for_build(mpd)?;
    println!("==> Testing {}", project.name);
    mpd.test(&project, options)?;
    println!("==> Tests of {} passed", project.name);
    Ok(())
}

pub fn zap(mpd: &Orchestrator<'_>, target: ZapTarget) -> Result<()> {
    mpd.prepare(&[Predicate::Initialized, Predicate::ProjectSelected], &[])?;
    let project = mpd.require_selected()?;
    mpd.zap(&project, target)?;
    match target {
        ZapTarget::Build => println!("==> Removed build area {}", project.build.display()),
        ZapTarget::Install => println!("==> Uninstalled developed packages of {}", project.name),
        ZapTarget::All => println!(
            "==> Removed build area {} and uninstalled developed packages",
            project.build.display()
        ),
    }
    Ok(())
}

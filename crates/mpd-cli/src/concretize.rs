//! Concretizing a project and installing its development environment.
//!
//! Shared by `new-project` and `refresh`.

use anyhow::Result;
use mpd_core::{Orchestrator, Project};

use crate::prompt;

/// Concretize `project`, list what must be installed, and install it.
///
/// Without `yes_to_all` the user may decline the installation and is asked
/// for the number of jobs.
pub fn concretize_and_install(mpd: &Orchestrator<'_>, mut project: Project, yes_to_all: bool) -> Result<()> {
    println!("==> Determining dependencies (this may take a few minutes)");
    let concretized = mpd.concretize(&mut project)?;

    let mut yes_to_all = yes_to_all;
    if concretized.absent.is_empty() {
        yes_to_all = true;
    } else {
        let width = format!("({})", concretized.absent.len()).len();
        println!("\n==> The following packages will be installed:\n");
        for (i, dependency) in concretized.absent.iter().enumerate() {
            println!(" {:>width$}  {dependency}", format!("({})", i + 1));
        }
        println!("\n  Please ensure you have adequate space for these installations.\n");
    }

    if !yes_to_all && !prompt::confirm("Would you like to continue?", true) {
        let local = project.local.display();
        println!(
            "\n==> To install the development environment later, invoke:\n\n  \
             > spack env activate {local}\n  \
             > spack install -j<ncores>\n  \
             > spack env deactivate\n"
        );
        return Ok(());
    }

    let default_jobs = mpd.settings().parallelism;
    let jobs = if yes_to_all {
        default_jobs
    } else {
        prompt::number("Specify number of cores to use", default_jobs)
    };

    println!("==> Installing development environment\n");
    mpd.install_environment(&mut project, Some(jobs))?;
    println!(
        "\n==> {} is ready for development (e.g. type 'mpd build ...')\n",
        project.name
    );
    Ok(())
}

//! Implementation of the `mpd rm-project` command.

use anyhow::Result;
use mpd_core::{Orchestrator, Predicate};

pub fn rm_project(mpd: &Orchestrator<'_>, name: &str, full: bool) -> Result<()> {
    mpd.prepare(&[Predicate::Initialized], &[])?;
    let project = mpd.remove_project(name, full)?;
    if full {
        println!("==> Removed project {name} and {}", project.top.display());
    } else {
        println!("==> Removed project {name}");
        println!("    Sources remain in {}", project.source.display());
    }
    Ok(())
}

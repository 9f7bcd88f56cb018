//! Implementation of the `mpd init` command.

use anyhow::Result;
use mpd_core::Orchestrator;

/// Create the MPD state directory and register its package repository.
pub fn init(mpd: &Orchestrator<'_>) -> Result<()> {
    let root = mpd.home().root().display().to_string();
    if mpd.init()? {
        println!("==> MPD initialized in {root}");
    } else {
        eprintln!("Warning: MPD already initialized on this system ({root})");
    }
    Ok(())
}

//! Production tools and the state they are configured from

use anyhow::{Context, Result};
use mpd_core::cmake::CMake;
use mpd_core::git::Git;
use mpd_core::session::SystemProcesses;
use mpd_core::spack::SpackCli;
use mpd_core::{MpdHome, Settings, Tools};

/// The state root and the user settings stored in it.
pub fn load() -> Result<(MpdHome, Settings)> {
    let home = MpdHome::from_env().context(
        "cannot determine the MPD state directory; set MPD_HOME or HOME",
    )?;
    let settings = Settings::load(&home.settings_file())
        .map_err(mpd_core::Error::from)
        .context("failed to read settings")?;
    Ok((home, settings))
}

/// Spack, CMake, git, and the process table of this machine.
pub struct HostTools {
    spack: SpackCli,
    cmake: CMake,
    git: Git,
    processes: SystemProcesses,
}

impl HostTools {
    pub fn new(settings: &Settings) -> Self {
        Self {
            spack: SpackCli::new(&settings.spack),
            cmake: CMake::new(&settings.cmake, &settings.ctest),
            git: Git::new(&settings.git),
            processes: SystemProcesses::new(),
        }
    }

    pub fn tools(&self) -> Tools<'_> {
        Tools {
            resolver: &self.spack,
            build: &self.cmake,
            source_control: &self.git,
            processes: &self.processes,
        }
    }
}

//! [`SourceControl`] implementation for the `git` command line

use crate::host::{command_line, CloneOutcome, SourceControl};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// The `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
}

impl Git {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new("git")
    }
}

impl SourceControl for Git {
    fn clone_repository(&self, url: &str, destination: &Path) -> CloneOutcome {
        if destination.exists() {
            return CloneOutcome::AlreadyExists;
        }

        let mut command = Command::new(&self.program);
        command
            .args(["clone", "--quiet", url])
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(command = %command_line(&command), "cloning");

        match command.output() {
            Ok(output) if output.status.success() => CloneOutcome::Cloned,
            Ok(output) => {
                let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if message.contains("already exists") {
                    CloneOutcome::AlreadyExists
                } else {
                    CloneOutcome::Failed(message)
                }
            }
            Err(e) => CloneOutcome::Failed(format!("failed to run git: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_destination_is_skipped() {
        let temp = TempDir::new().unwrap();
        let outcome = Git::default().clone_repository("https://example.invalid/x.git", temp.path());
        assert_eq!(outcome, CloneOutcome::AlreadyExists);
    }

    #[test]
    fn test_missing_program_fails() {
        let temp = TempDir::new().unwrap();
        let git = Git::new(temp.path().join("no-such-git"));
        let outcome = git.clone_repository("https://example.invalid/x.git", &temp.path().join("x"));
        assert!(matches!(outcome, CloneOutcome::Failed(_)));
    }
}

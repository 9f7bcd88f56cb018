//! Per-shell project selection
//!
//! Each shell session owns one token file, named after its session id and
//! containing the selected project name. Several sessions may select the
//! same project.

use crate::store::{write_atomic, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, Process, System};
use tracing::debug;

/// Identifier of a shell session (the pid of its session leader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queries against the host's process table.
pub trait ProcessTable {
    /// Whether the leader of `session` is still running.
    fn is_alive(&self, session: SessionId) -> bool;

    /// Session of the calling process.
    fn current_session(&self) -> SessionId;
}

/// [`ProcessTable`] backed by a `sysinfo` snapshot.
pub struct SystemProcesses {
    system: System,
}

impl SystemProcesses {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcesses {
    fn is_alive(&self, session: SessionId) -> bool {
        self.system.process(Pid::from_u32(session.0)).is_some()
    }

    fn current_session(&self) -> SessionId {
        let pid = sysinfo::get_current_pid().ok();
        let session = pid
            .and_then(|pid| self.system.process(pid))
            .and_then(Process::session_id)
            .or(pid)
            .map_or_else(std::process::id, |pid| pid.as_u32());
        SessionId(session)
    }
}

/// Result of selecting a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOutcome {
    /// The current session had already selected this project.
    pub already_selected: bool,
    /// Other sessions that have the same project selected.
    pub other_sessions: BTreeSet<SessionId>,
}

/// Reads and writes selection tokens for one session.
#[derive(Debug, Clone)]
pub struct SessionSelector {
    dir: PathBuf,
    session: SessionId,
}

impl SessionSelector {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, session: SessionId) -> Self {
        Self {
            dir: dir.into(),
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn token_path(&self, session: SessionId) -> PathBuf {
        self.dir.join(session.to_string())
    }

    /// Select `name` for the current session.
    pub fn select(&self, name: &str) -> Result<SelectOutcome, StorageError> {
        let already_selected = self.current()?.as_deref() == Some(name);
        let other_sessions = self
            .all_selections()?
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .filter(|session| *session != self.session)
            .collect();

        if !already_selected {
            write_atomic(&self.token_path(self.session), name.as_bytes())?;
            debug!(session = %self.session, project = name, "selected project");
        }

        Ok(SelectOutcome {
            already_selected,
            other_sessions,
        })
    }

    /// Project selected by the current session.
    pub fn current(&self) -> Result<Option<String>, StorageError> {
        let path = self.token_path(self.session);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Every selection token on disk as (session, project).
    pub fn tokens(&self) -> Result<Vec<(SessionId, String)>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut tokens = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let Some(session) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse().ok())
                .map(SessionId)
            else {
                continue;
            };
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }
            // Another shell may prune the token between listing and reading.
            let text = match fs::read_to_string(entry.path()) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(entry.path(), e)),
            };
            tokens.push((session, text.trim().to_string()));
        }
        tokens.sort();
        Ok(tokens)
    }

    /// Project name -> sessions that selected it.
    pub fn all_selections(&self) -> Result<BTreeMap<String, BTreeSet<SessionId>>, StorageError> {
        let mut selections: BTreeMap<String, BTreeSet<SessionId>> = BTreeMap::new();
        for (session, project) in self.tokens()? {
            selections.entry(project).or_default().insert(session);
        }
        Ok(selections)
    }

    /// Remove the current session's token. Returns whether one existed.
    pub fn deselect(&self) -> Result<bool, StorageError> {
        self.remove_token(self.session)
    }

    /// Remove the token of any session.
    pub fn remove_token(&self, session: SessionId) -> Result<bool, StorageError> {
        let path = self.token_path(session);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Remove every session's token that refers to `project`.
    pub fn deselect_project(&self, project: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for (session, name) in self.tokens()? {
            if name == project && self.remove_token(session)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every token from every session.
    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for (session, _) in self.tokens()? {
            if self.remove_token(session)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn selector(temp: &TempDir, session: u32) -> SessionSelector {
        let dir = temp.path().join("selected");
        fs::create_dir_all(&dir).unwrap();
        SessionSelector::new(dir, SessionId(session))
    }

    #[test]
    fn test_select_and_current() {
        let temp = TempDir::new().unwrap();
        let shell = selector(&temp, 100);
        assert_eq!(shell.current().unwrap(), None);

        let outcome = shell.select("demo").unwrap();
        assert!(!outcome.already_selected);
        assert!(outcome.other_sessions.is_empty());
        assert_eq!(shell.current().unwrap().as_deref(), Some("demo"));

        assert!(shell.select("demo").unwrap().already_selected);
    }

    #[test]
    fn test_shared_selection_reported() {
        let temp = TempDir::new().unwrap();
        let first = selector(&temp, 100);
        let second = selector(&temp, 200);

        first.select("demo").unwrap();
        let outcome = second.select("demo").unwrap();
        assert_eq!(outcome.other_sessions, BTreeSet::from([SessionId(100)]));

        let all = second.all_selections().unwrap();
        assert_eq!(all["demo"].len(), 2);
    }

    #[test]
    fn test_deselect_only_current() {
        let temp = TempDir::new().unwrap();
        let first = selector(&temp, 100);
        let second = selector(&temp, 200);
        first.select("demo").unwrap();
        second.select("other").unwrap();

        assert!(first.deselect().unwrap());
        assert!(!first.deselect().unwrap());
        assert_eq!(second.current().unwrap().as_deref(), Some("other"));
    }

    #[test]
    fn test_deselect_project_and_clear_all() {
        let temp = TempDir::new().unwrap();
        selector(&temp, 1).select("demo").unwrap();
        selector(&temp, 2).select("demo").unwrap();
        selector(&temp, 3).select("other").unwrap();

        let shell = selector(&temp, 4);
        assert_eq!(shell.deselect_project("demo").unwrap(), 2);
        assert_eq!(shell.tokens().unwrap(), vec![(SessionId(3), "other".to_string())]);
        assert_eq!(shell.clear_all().unwrap(), 1);
        assert!(shell.all_selections().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_files_ignored() {
        let temp = TempDir::new().unwrap();
        let shell = selector(&temp, 7);
        fs::write(shell.dir().join("README"), "not a token").unwrap();
        shell.select("demo").unwrap();
        assert_eq!(shell.tokens().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_vanished_token_skipped() {
        let temp = TempDir::new().unwrap();
        let shell = selector(&temp, 7);
        shell.select("demo").unwrap();
        // Listed by read_dir, gone by the time it is read.
        std::os::unix::fs::symlink(temp.path().join("pruned"), shell.dir().join("4242")).unwrap();
        fs::create_dir(shell.dir().join("4243")).unwrap();

        assert_eq!(shell.tokens().unwrap(), vec![(SessionId(7), "demo".to_string())]);
        assert_eq!(shell.clear_all().unwrap(), 1);
    }

    #[test]
    fn test_system_processes_sees_itself() {
        let processes = SystemProcesses::new();
        assert!(processes.is_alive(SessionId(std::process::id())));
        assert!(!processes.is_alive(SessionId(u32::MAX)));
    }
}

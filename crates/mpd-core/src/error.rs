//! Crate-wide error type

use crate::classify::ClassifyError;
use crate::host::ExternalToolError;
use crate::lifecycle::PreconditionError;
use crate::order::{CyclicDependencyError, MissingIntermediateDependencies};
use crate::spec::MalformedSpecError;
use crate::store::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure an mpd operation can report.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    MalformedSpec(#[from] MalformedSpecError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("project '{0}' does not exist")]
    ProjectNotFound(String),

    #[error("project '{0}' already exists (use --force to replace it)")]
    ProjectExists(String),

    #[error("invalid project name '{name}': {reason}")]
    InvalidProjectName { name: String, reason: &'static str },

    #[error("no project has top-level directory '{}'", .0.display())]
    NoProjectAtDirectory(PathBuf),

    #[error("no projects exist; create one with 'mpd new-project'")]
    NoProjects,

    #[error("unsupported generator '{0}' (expected 'make' or 'ninja')")]
    UnsupportedGenerator(String),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("cannot remove project '{0}' while its environment is active")]
    EnvironmentActive(String),

    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),

    #[error(transparent)]
    MissingIntermediate(#[from] MissingIntermediateDependencies),

    #[error(transparent)]
    Tool(#[from] ExternalToolError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Coarse classification of an [`Error`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    Precondition,
    Consistency,
    ExternalTool,
    Storage,
}

impl ErrorKind {
    /// Process exit code for this kind. Never zero.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::UserInput => 1,
            Self::Precondition => 2,
            Self::Consistency => 3,
            Self::ExternalTool => 4,
            Self::Storage => 5,
        }
    }
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedSpec(_)
            | Self::Classify(_)
            | Self::ProjectNotFound(_)
            | Self::ProjectExists(_)
            | Self::InvalidProjectName { .. }
            | Self::NoProjectAtDirectory(_)
            | Self::NoProjects
            | Self::UnsupportedGenerator(_) => ErrorKind::UserInput,
            Self::Precondition(_) | Self::EnvironmentActive(_) => ErrorKind::Precondition,
            Self::Cycle(_) | Self::MissingIntermediate(_) => ErrorKind::Consistency,
            Self::Tool(_) => ErrorKind::ExternalTool,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Command preconditions
//!
//! Every command declares which states must hold and which must not. All
//! predicates are evaluated and every violation is reported together.

use crate::home::MpdHome;
use crate::host::Resolver;
use crate::project::{same_directory, Project};
use crate::session::SessionSelector;
use crate::store::{ConfigStore, StorageError};
use std::collections::BTreeSet;
use std::fmt;

/// A state a command can require or forbid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Predicate {
    Initialized,
    ProjectSelected,
    PackagesPresent,
    /// The environment tied to the selected project's local directory is active.
    EnvironmentActiveForSelectedProject,
}

impl Predicate {
    fn describe(self, required: bool) -> String {
        let must = if required { "must" } else { "must not" };
        match self {
            Self::Initialized => format!("MPD {must} be initialized"),
            Self::ProjectSelected => format!("An MPD project {must} be selected"),
            Self::PackagesPresent => {
                format!("The selected project {must} have packages to develop")
            }
            Self::EnvironmentActiveForSelectedProject => {
                format!("The environment of the selected project {must} be active")
            }
        }
    }
}

/// One unmet precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub predicate: Predicate,
    /// Whether the predicate was required (as opposed to forbidden).
    pub required: bool,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.predicate.describe(self.required))
    }
}

/// Every precondition a command found unmet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "To execute this command, the following preconditions must be met:"
        )?;
        for violation in &self.violations {
            write!(f, "\n - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PreconditionError {}

/// Evaluates predicates against the current state.
pub struct Lifecycle<'a> {
    home: &'a MpdHome,
    store: &'a ConfigStore,
    selector: &'a SessionSelector,
    resolver: &'a dyn Resolver,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        home: &'a MpdHome,
        store: &'a ConfigStore,
        selector: &'a SessionSelector,
        resolver: &'a dyn Resolver,
    ) -> Self {
        Self {
            home,
            store,
            selector,
            resolver,
        }
    }

    /// The selected project, if its token exists and the project is known.
    pub fn selected_project(&self) -> Result<Option<Project>, StorageError> {
        match self.selector.current()? {
            Some(name) => self.store.get(&name),
            None => Ok(None),
        }
    }

    /// Whether the environment of `project` is the active one.
    #[must_use]
    pub fn environment_active_for(&self, project: &Project) -> bool {
        self.resolver
            .active_environment()
            .is_some_and(|active| same_directory(&active, &project.local))
    }

    pub fn evaluate(&self, predicate: Predicate) -> Result<bool, StorageError> {
        Ok(match predicate {
            Predicate::Initialized => self.home.is_initialized(),
            Predicate::ProjectSelected => self.selected_project()?.is_some(),
            Predicate::PackagesPresent => self
                .selected_project()?
                .is_some_and(|project| project.has_packages()),
            Predicate::EnvironmentActiveForSelectedProject => self
                .selected_project()?
                .is_some_and(|project| self.environment_active_for(&project)),
        })
    }

    /// Fail with every violation when any required predicate is false or
    /// any forbidden predicate is true.
    pub fn check(
        &self,
        required: &[Predicate],
        forbidden: &[Predicate],
    ) -> crate::Result<()> {
        let required: BTreeSet<_> = required.iter().copied().collect();
        let forbidden: BTreeSet<_> = forbidden.iter().copied().collect();

        let mut violations = Vec::new();
        for predicate in required.union(&forbidden).copied() {
            let holds = self.evaluate(predicate)?;
            if required.contains(&predicate) && !holds {
                violations.push(Violation {
                    predicate,
                    required: true,
                });
            }
            if forbidden.contains(&predicate) && holds {
                violations.push(Violation {
                    predicate,
                    required: false,
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PreconditionError { violations }.into())
        }
    }
}

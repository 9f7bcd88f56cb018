//! Self-repair of cached state, run before every command except `init`

use crate::host::Resolver;
use crate::project::{same_directory, ProjectStatus};
use crate::session::{ProcessTable, SessionId, SessionSelector};
use crate::store::{ConfigStore, StorageError};
use tracing::{info, warn};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Projects whose environment vanished; their status was reset.
    pub reset_status: Vec<String>,
    /// Projects whose install record pointed at a missing environment.
    pub dropped_installs: Vec<String>,
    /// Selection tokens removed because their shell exited or their
    /// project no longer exists.
    pub pruned_tokens: Vec<(SessionId, String)>,
    /// Project selected because its environment is active.
    pub implicitly_selected: Option<String>,
}

/// Bring the configuration and selection tokens in line with the host.
///
/// Idempotent: a second pass over unchanged state changes nothing.
pub fn reconcile_cache(
    store: &ConfigStore,
    selector: &SessionSelector,
    resolver: &dyn Resolver,
    processes: &dyn ProcessTable,
) -> Result<ReconcileReport, StorageError> {
    let mut report = ReconcileReport::default();
    let loaded = store.load()?;
    let mut doc = loaded.clone().unwrap_or_default();

    for (name, project) in &mut doc.projects {
        if project.status != ProjectStatus::None && !resolver.is_environment(&project.local) {
            warn!(project = %name, "environment missing; resetting status");
            project.status = ProjectStatus::None;
            report.reset_status.push(name.clone());
        }
        let stale_install = project
            .installed
            .as_ref()
            .is_some_and(|record| !resolver.is_environment(&record.environment));
        if stale_install {
            warn!(project = %name, "install environment missing; dropping install record");
            project.installed = None;
            report.dropped_installs.push(name.clone());
        }
    }

    if loaded.as_ref() != Some(&doc) && loaded.is_some() {
        store.save(&doc)?;
    }

    for (session, project) in selector.tokens()? {
        let dead = session != selector.session() && !processes.is_alive(session);
        if dead || !doc.projects.contains_key(&project) {
            warn!(session = %session, project = %project, "pruning stale selection");
            selector.remove_token(session)?;
            report.pruned_tokens.push((session, project));
        }
    }

    if let Some(active) = resolver.active_environment() {
        let matching = doc
            .projects
            .values()
            .find(|project| same_directory(&active, &project.local));
        if let Some(project) = matching {
            if selector.current()?.as_deref() != Some(project.name.as_str()) {
                selector.select(&project.name)?;
                info!(project = %project.name, "selected project of active environment");
                report.implicitly_selected = Some(project.name.clone());
            }
        }
    }

    Ok(report)
}

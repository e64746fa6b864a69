//! Thread-safe table of active tasks.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courseflow_core::TaskId;

/// Registry-side state for one active task.
struct ActiveTask {
    name: String,
    cancel: CancellationToken,
    /// Set by the dispatcher's supervisor once the worker has exited.
    /// `list_active` prunes finished entries before snapshotting.
    finished: bool,
    registered_at: DateTime<Utc>,
}

/// Owned snapshot of a registry entry. Callers never observe the live table.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTaskSnapshot {
    /// Unique task identifier.
    pub id: TaskId,
    /// Display label.
    pub name: String,
    /// True if a cooperative stop has been requested.
    pub stop_requested: bool,
    /// When the task was registered.
    pub registered_at: DateTime<Utc>,
}

/// Thread-safe table of active tasks.
///
/// All operations go through a single mutex around the table; no lock is
/// ever held across a callback, and there is no nested locking. Stop
/// requests are cooperative: the registry only cancels the task's token,
/// and the worker decides when (or whether) to honor it.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, ActiveTask>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Running task with its cancellation token.
    pub fn register(&self, id: TaskId, name: impl Into<String>, cancel: CancellationToken) {
        let mut tasks = self.lock();
        let entry = ActiveTask {
            name: name.into(),
            cancel,
            finished: false,
            registered_at: Utc::now(),
        };
        if tasks.insert(id.clone(), entry).is_some() {
            // Ids are generated fresh per task, so this indicates a bug.
            warn!(task_id = %id, "duplicate task id registered; previous entry replaced");
        }
    }

    /// Remove a task from the table. Returns false if it was not present.
    pub fn unregister(&self, id: &TaskId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Request a cooperative stop for a task.
    ///
    /// Returns false for an unknown id; absence is an expected condition,
    /// not a fault. Does not forcibly terminate the worker.
    pub fn request_stop(&self, id: &TaskId) -> bool {
        let tasks = self.lock();
        match tasks.get(id) {
            Some(entry) => {
                info!(task_id = %id, name = %entry.name, "stop requested");
                entry.cancel.cancel();
                true
            }
            None => {
                debug!(task_id = %id, "stop requested for unknown task");
                false
            }
        }
    }

    /// Record that a task's worker has exited. Called by the dispatcher's
    /// supervisor; the entry is pruned on the next `list_active`.
    pub fn mark_finished(&self, id: &TaskId) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.finished = true;
        }
    }

    /// Snapshot the tasks whose workers are still alive, pruning entries
    /// whose worker has already exited.
    pub fn list_active(&self) -> Vec<ActiveTaskSnapshot> {
        let mut tasks = self.lock();
        tasks.retain(|_, entry| !entry.finished);
        tasks
            .iter()
            .map(|(id, entry)| ActiveTaskSnapshot {
                id: id.clone(),
                name: entry.name.clone(),
                stop_requested: entry.cancel.is_cancelled(),
                registered_at: entry.registered_at,
            })
            .collect()
    }

    /// Number of entries currently in the table (including finished
    /// entries not yet pruned).
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Request a cooperative stop for every registered task.
    pub fn stop_all(&self) {
        let tasks = self.lock();
        if !tasks.is_empty() {
            info!(count = tasks.len(), "stopping all tasks");
        }
        for entry in tasks.values() {
            entry.cancel.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, ActiveTask>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_stop() {
        let registry = TaskRegistry::new();
        let id = TaskId::generate();
        let cancel = CancellationToken::new();
        registry.register(id.clone(), "Fetch", cancel.clone());

        assert_eq!(registry.count(), 1);
        assert!(!cancel.is_cancelled());
        assert!(registry.request_stop(&id));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_request_stop_unknown_id() {
        let registry = TaskRegistry::new();
        assert!(!registry.request_stop(&TaskId::generate()));
    }

    #[test]
    fn test_unregister() {
        let registry = TaskRegistry::new();
        let id = TaskId::generate();
        registry.register(id.clone(), "Upload", CancellationToken::new());

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_list_active_prunes_finished() {
        let registry = TaskRegistry::new();
        let alive = TaskId::generate();
        let done = TaskId::generate();
        registry.register(alive.clone(), "Scrape", CancellationToken::new());
        registry.register(done.clone(), "Upload", CancellationToken::new());

        registry.mark_finished(&done);
        let active = registry.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, alive);
        // pruned from the table, not just filtered from the view
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_snapshot_reflects_stop_request() {
        let registry = TaskRegistry::new();
        let id = TaskId::generate();
        registry.register(id.clone(), "Draft answers", CancellationToken::new());

        assert!(!registry.list_active()[0].stop_requested);
        registry.request_stop(&id);
        assert!(registry.list_active()[0].stop_requested);
    }

    #[test]
    fn test_stop_all() {
        let registry = TaskRegistry::new();
        let tokens: Vec<CancellationToken> = (0..3)
            .map(|i| {
                let cancel = CancellationToken::new();
                registry.register(TaskId::generate(), format!("task-{i}"), cancel.clone());
                cancel
            })
            .collect();

        registry.stop_all();
        assert!(tokens.iter().all(|t| t.is_cancelled()));
    }
}

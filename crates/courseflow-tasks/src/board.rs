//! Single-consumer board owning all visible task state.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use courseflow_core::{ProgressEvent, TaskError, TaskId, TaskRecord, TaskSnapshot, Transition};

use crate::dispatcher::Dispatcher;
use crate::registry::TaskRegistry;

/// Zero-argument completion callback, invoked at most once on the
/// Succeeded transition.
pub type SuccessCallback = Box<dyn FnOnce() + Send + 'static>;

/// Messages crossing from worker contexts to the board's owning thread.
///
/// Per-sender FIFO on the channel gives per-task delivery order: the
/// dispatcher posts `Started` before the worker can emit, and each worker
/// emits its own events in program order.
pub enum BoardMessage {
    /// A task was dispatched; create its record.
    Started {
        id: TaskId,
        name: String,
        on_success: Option<SuccessCallback>,
    },
    /// A worker reported progress for a task.
    Progress { id: TaskId, event: ProgressEvent },
}

/// Board-side state for one task: the record plus its pending callback.
struct Entry {
    record: TaskRecord,
    on_success: Option<SuccessCallback>,
}

/// The single consumer of progress events.
///
/// Owns every task record; workers never mutate records directly but hand
/// events to the channel, and the owning thread applies them here in
/// delivery order. Construct one board per process, hand out
/// [`Dispatcher`] clones to code that starts tasks, and call
/// [`TaskBoard::cleanup`] at shutdown.
pub struct TaskBoard {
    registry: Arc<TaskRegistry>,
    tx: mpsc::UnboundedSender<BoardMessage>,
    rx: mpsc::UnboundedReceiver<BoardMessage>,
    entries: HashMap<TaskId, Entry>,
}

impl TaskBoard {
    /// Create a board with its own registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new()))
    }

    /// Create a board over an existing registry.
    pub fn with_registry(registry: Arc<TaskRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry,
            tx,
            rx,
            entries: HashMap::new(),
        }
    }

    /// The registry tracking this board's active tasks.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Mint a clonable handle for starting tasks against this board.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.registry), self.tx.clone())
    }

    /// Start a task against this board. Delegates to [`Dispatcher::start`].
    pub fn start<F, Fut>(&self, name: impl Into<String>, work: F) -> TaskId
    where
        F: FnOnce(crate::emitter::ProgressEmitter) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), courseflow_core::WorkError>> + Send + 'static,
    {
        self.dispatcher().start(name, work)
    }

    /// Start a task with a completion callback. Delegates to
    /// [`Dispatcher::start_with`].
    pub fn start_with<F, Fut>(
        &self,
        name: impl Into<String>,
        work: F,
        on_success: impl FnOnce() + Send + 'static,
    ) -> TaskId
    where
        F: FnOnce(crate::emitter::ProgressEmitter) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), courseflow_core::WorkError>> + Send + 'static,
    {
        self.dispatcher().start_with(name, work, on_success)
    }

    /// Drain and apply every queued message. Non-blocking; call from the
    /// owning thread, e.g. once per UI tick. Returns how many messages
    /// were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Await and apply the next message. Returns false once the channel
    /// is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.apply(message);
                true
            }
            None => false,
        }
    }

    /// Apply one cross-thread message to board state.
    pub fn apply(&mut self, message: BoardMessage) {
        match message {
            BoardMessage::Started {
                id,
                name,
                on_success,
            } => {
                debug!(task_id = %id, name = %name, "task started");
                let entry = Entry {
                    record: TaskRecord::new(id.clone(), name),
                    on_success,
                };
                if self.entries.insert(id.clone(), entry).is_some() {
                    warn!(task_id = %id, "duplicate task id on board; previous entry replaced");
                }
            }
            BoardMessage::Progress { id, event } => self.handle(&id, event),
        }
    }

    /// Apply a progress event to a task's record.
    ///
    /// Field updates are last-write-wins per field. The first error marks
    /// the task Failed; otherwise the first 100% progress marks it
    /// Succeeded and fires the completion callback exactly once. Unknown
    /// ids (task dismissed while events were in flight) are ignored.
    /// Must only be called on the board's owning thread; workers deliver
    /// through the channel instead.
    pub fn handle(&mut self, id: &TaskId, event: ProgressEvent) {
        let Some(entry) = self.entries.get_mut(id) else {
            debug!(task_id = %id, "event for unknown task ignored");
            return;
        };

        let transition = entry.record.apply(&event);
        let callback = match transition {
            Transition::Succeeded => entry.on_success.take(),
            Transition::Failed => {
                warn!(
                    task_id = %id,
                    name = %entry.record.name,
                    error = entry.record.error_text.as_deref().unwrap_or(""),
                    "task failed"
                );
                None
            }
            Transition::None => None,
        };

        // Invoked after the record update is complete and no table borrow
        // is held, so a callback may re-enter the board's dispatcher.
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!(task_id = %id, "completion callback panicked");
            }
        }
    }

    /// Remove a task's record and unregister it. Valid in any state;
    /// later in-flight events for the id are ignored. Returns false for
    /// an unknown id.
    pub fn dismiss(&mut self, id: &TaskId) -> bool {
        let removed = self.entries.remove(id).is_some();
        self.registry.unregister(id);
        removed
    }

    /// Dismiss every task in a terminal state, leaving Running tasks and
    /// their future event handling intact. Returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let finished: Vec<TaskId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.record.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &finished {
            self.dismiss(id);
        }
        finished.len()
    }

    /// True if any task on the board is still Running.
    pub fn has_active(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.record.state.is_active())
    }

    /// Number of records on the board (terminal ones included until
    /// dismissed).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no records are on the board.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a task's record.
    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.entries.get(id).map(|entry| &entry.record)
    }

    /// Strict lookup for callers that treat absence as an error rather
    /// than the usual benign no-op.
    pub fn try_get(&self, id: &TaskId) -> Result<&TaskRecord, TaskError> {
        self.get(id)
            .ok_or_else(|| TaskError::TaskNotFound(id.clone()))
    }

    /// Snapshot every record for rendering, oldest first.
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut records: Vec<&TaskRecord> =
            self.entries.values().map(|entry| &entry.record).collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        records.iter().map(|record| record.snapshot()).collect()
    }

    /// Shutdown teardown: request a stop for everything still running and
    /// drop all records and pending callbacks.
    pub fn cleanup(&mut self) {
        self.registry.stop_all();
        for id in self.entries.keys() {
            self.registry.unregister(id);
        }
        self.entries.clear();
    }
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseflow_core::TaskState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn board_with_task(name: &str) -> (TaskBoard, TaskId) {
        let mut board = TaskBoard::new();
        let id = TaskId::generate();
        board.apply(BoardMessage::Started {
            id: id.clone(),
            name: name.to_string(),
            on_success: None,
        });
        (board, id)
    }

    #[test]
    fn test_handle_updates_record() {
        let (mut board, id) = board_with_task("Fetch");
        board.handle(
            &id,
            ProgressEvent::new().with_progress(40).with_status("Scraping"),
        );

        let record = board.get(&id).unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.status_text.as_deref(), Some("Scraping"));
        assert_eq!(record.state, TaskState::Running);
    }

    #[test]
    fn test_on_success_fires_exactly_once() {
        let mut board = TaskBoard::new();
        let id = TaskId::generate();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = Arc::clone(&fired);
        board.apply(BoardMessage::Started {
            id: id.clone(),
            name: "Fetch".to_string(),
            on_success: Some(Box::new(move || {
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        });

        // duplicate back-to-back terminal events
        board.handle(&id, ProgressEvent::new().with_progress(100));
        board.handle(&id, ProgressEvent::new().with_progress(100));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(board.get(&id).unwrap().state, TaskState::Succeeded);
    }

    #[test]
    fn test_failure_suppresses_success_callback() {
        let mut board = TaskBoard::new();
        let id = TaskId::generate();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = Arc::clone(&fired);
        board.apply(BoardMessage::Started {
            id: id.clone(),
            name: "Upload".to_string(),
            on_success: Some(Box::new(move || {
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        });

        board.handle(&id, ProgressEvent::new().with_progress(50));
        board.handle(&id, ProgressEvent::new().with_error("disk full"));
        board.handle(&id, ProgressEvent::new().with_progress(100));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        let record = board.get(&id).unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.error_text.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let mut board = TaskBoard::new();
        let id = TaskId::generate();
        board.apply(BoardMessage::Started {
            id: id.clone(),
            name: "Fetch".to_string(),
            on_success: Some(Box::new(|| panic!("broken callback"))),
        });

        board.handle(&id, ProgressEvent::new().with_progress(100));

        // board state is intact and still usable
        assert_eq!(board.get(&id).unwrap().state, TaskState::Succeeded);
        board.handle(&id, ProgressEvent::new().with_status("late update"));
        assert_eq!(
            board.get(&id).unwrap().status_text.as_deref(),
            Some("late update")
        );
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let (mut board, _id) = board_with_task("Fetch");
        board.handle(&TaskId::generate(), ProgressEvent::new().with_progress(10));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_try_get_unknown_id() {
        let (board, id) = board_with_task("Fetch");
        assert!(board.try_get(&id).is_ok());
        assert!(matches!(
            board.try_get(&TaskId::generate()),
            Err(TaskError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_dismiss_orphans_in_flight_events() {
        let (mut board, id) = board_with_task("Fetch");
        assert!(board.dismiss(&id));
        assert!(!board.dismiss(&id));

        // events arriving after dismissal are ignored safely
        board.handle(&id, ProgressEvent::new().with_progress(100));
        assert!(board.is_empty());
    }

    #[test]
    fn test_clear_completed_keeps_running_tasks() {
        let mut board = TaskBoard::new();
        let running = TaskId::generate();
        let succeeded = TaskId::generate();
        let failed = TaskId::generate();
        for (id, name) in [(&running, "a"), (&succeeded, "b"), (&failed, "c")] {
            board.apply(BoardMessage::Started {
                id: id.clone(),
                name: name.to_string(),
                on_success: None,
            });
        }
        board.handle(&succeeded, ProgressEvent::new().with_progress(100));
        board.handle(&failed, ProgressEvent::new().with_error("boom"));

        assert_eq!(board.clear_completed(), 2);
        assert_eq!(board.len(), 1);
        assert!(board.has_active());

        // the surviving task still handles events
        board.handle(&running, ProgressEvent::new().with_progress(70));
        assert_eq!(board.get(&running).unwrap().progress, 70);
    }

    #[test]
    fn test_has_active() {
        let (mut board, id) = board_with_task("Fetch");
        assert!(board.has_active());
        board.handle(&id, ProgressEvent::new().with_progress(100));
        assert!(!board.has_active());
    }

    #[test]
    fn test_cleanup_tears_down_entries() {
        let (mut board, id) = board_with_task("Fetch");
        board.cleanup();
        assert!(board.is_empty());
        assert_eq!(board.registry().count(), 0);
        // late events after cleanup are ignored
        board.handle(&id, ProgressEvent::new().with_progress(100));
    }

    #[test]
    fn test_snapshots_oldest_first() {
        let mut board = TaskBoard::new();
        let ids: Vec<TaskId> = (0..3).map(|_| TaskId::generate()).collect();
        for (i, id) in ids.iter().enumerate() {
            board.apply(BoardMessage::Started {
                id: id.clone(),
                name: format!("task-{i}"),
                on_success: None,
            });
        }
        let snapshots = board.snapshots();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].name, "task-0");
        assert_eq!(snapshots[2].name, "task-2");
    }
}

//! Spawns workers and guarantees terminal notifications.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use courseflow_core::{ProgressEvent, TaskId, WorkError};

use crate::board::{BoardMessage, SuccessCallback};
use crate::emitter::ProgressEmitter;
use crate::registry::TaskRegistry;

/// Clonable handle for starting background tasks against a board.
///
/// Each started task gets its own worker, a [`ProgressEmitter`] bound to
/// its id, and a supervisor that converts the work's outcome - normal
/// return, error return, or panic - into a terminal event on the same
/// channel ordinary progress travels. A crashing task surfaces as a
/// Failed card, never as a silent hang or a process crash.
///
/// The dispatcher is agnostic to what the work does; scraping, LLM calls,
/// and uploads all use the same contract.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    tx: mpsc::UnboundedSender<BoardMessage>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<TaskRegistry>, tx: mpsc::UnboundedSender<BoardMessage>) -> Self {
        Self { registry, tx }
    }

    /// The registry this dispatcher registers tasks with.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Start a task with no completion callback.
    pub fn start<F, Fut>(&self, name: impl Into<String>, work: F) -> TaskId
    where
        F: FnOnce(ProgressEmitter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        self.spawn(name.into(), work, None)
    }

    /// Start a task whose callback runs on the board's owning thread,
    /// exactly once, if and when the task succeeds.
    pub fn start_with<F, Fut>(
        &self,
        name: impl Into<String>,
        work: F,
        on_success: impl FnOnce() + Send + 'static,
    ) -> TaskId
    where
        F: FnOnce(ProgressEmitter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        self.spawn(name.into(), work, Some(Box::new(on_success)))
    }

    fn spawn<F, Fut>(&self, name: String, work: F, on_success: Option<SuccessCallback>) -> TaskId
    where
        F: FnOnce(ProgressEmitter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let id = TaskId::generate();
        let cancel = CancellationToken::new();
        self.registry.register(id.clone(), &name, cancel.clone());

        // Posted before the worker spawns, so channel FIFO guarantees the
        // board sees the record before any of its events.
        if self
            .tx
            .send(BoardMessage::Started {
                id: id.clone(),
                name,
                on_success,
            })
            .is_err()
        {
            warn!(task_id = %id, "board channel closed; task will run unobserved");
        }

        let emitter = ProgressEmitter::bound(id.clone(), self.tx.clone(), cancel);
        let worker = tokio::spawn(work(emitter));

        let registry = Arc::clone(&self.registry);
        let tx = self.tx.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let event = match worker.await {
                // No status label here: a bare 100 completes tasks that
                // never emitted while leaving a worker-chosen terminal
                // label (finish_with_status) intact under last-write-wins.
                Ok(Ok(())) => ProgressEvent::new().with_progress(100),
                Ok(Err(err)) => {
                    error!(task_id = %task_id, error = %err, "task failed");
                    ProgressEvent::new().with_error(err.to_string())
                }
                Err(join_err) => {
                    let message = describe_crash(join_err);
                    error!(task_id = %task_id, "{message}");
                    ProgressEvent::new().with_error(message)
                }
            };
            if tx
                .send(BoardMessage::Progress {
                    id: task_id.clone(),
                    event,
                })
                .is_err()
            {
                warn!(task_id = %task_id, "terminal event dropped: board channel closed");
            }
            registry.mark_finished(&task_id);
        });

        id
    }
}

/// Recover a readable message from a worker that did not return normally.
fn describe_crash(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(text) = payload.downcast_ref::<&str>() {
            format!("task panicked: {text}")
        } else if let Some(text) = payload.downcast_ref::<String>() {
            format!("task panicked: {text}")
        } else {
            "task panicked".to_string()
        }
    } else {
        "task was aborted".to_string()
    }
}

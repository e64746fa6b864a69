//! Core domain errors.

use crate::TaskId;
use thiserror::Error;

/// Boxed error returned by a unit of work. Collaborators (portal client,
/// LLM calls, uploads) convert their own error types into this with `?`.
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core domain errors for the task orchestration layer.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found. Most board/registry operations treat an unknown id
    /// as a benign no-op; this variant is for callers that need a hard
    /// lookup.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The board's event channel is closed (board dropped or cleaned up).
    #[error("Task board has shut down")]
    BoardClosed,
}

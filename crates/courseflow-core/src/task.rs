//! Task record and display snapshot types.

use crate::{ProgressEvent, TaskId, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of applying a progress event to a task record.
///
/// Only the first terminal transition is reported; applying further events
/// to an already-terminal record always yields `None`, so completion side
/// effects run at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No lifecycle change; display fields may still have been updated.
    None,
    /// The record just moved Running -> Succeeded.
    Succeeded,
    /// The record just moved Running -> Failed.
    Failed,
}

/// Mutable per-task state owned by the board.
///
/// Workers never touch this type directly; every mutation arrives as a
/// [`ProgressEvent`] through [`TaskRecord::apply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: TaskId,

    /// Display label, immutable after creation.
    pub name: String,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Last reported completion percentage (0-100). Last write wins;
    /// monotonicity is not enforced.
    pub progress: u8,

    /// Last reported status label.
    pub status_text: Option<String>,

    /// Last reported throughput text.
    pub speed_text: Option<String>,

    /// Last reported detail line.
    pub detail_text: Option<String>,

    /// Failure description. Once set the record is Failed permanently;
    /// later non-error events never clear it.
    pub error_text: Option<String>,

    /// When the task was registered.
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new Running record.
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: TaskState::Running,
            progress: 0,
            status_text: None,
            speed_text: None,
            detail_text: None,
            error_text: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a progress event: each present field last-write-wins, then
    /// resolve the lifecycle.
    ///
    /// An error marks the record Failed; the first error wins and later
    /// errors only refresh the displayed text. Without an error, 100%
    /// progress on a Running record marks it Succeeded. A Failed record
    /// keeps whatever progress value it last saw.
    pub fn apply(&mut self, event: &ProgressEvent) -> Transition {
        if let Some(progress) = event.progress {
            self.progress = progress.min(100);
        }
        if let Some(status) = &event.status {
            self.status_text = Some(status.clone());
        }
        if let Some(speed) = &event.speed {
            self.speed_text = Some(speed.clone());
        }
        if let Some(detail) = &event.detail {
            self.detail_text = Some(detail.clone());
        }

        if let Some(error) = &event.error {
            self.error_text = Some(error.clone());
            if self.state != TaskState::Failed {
                let first_failure = self.state == TaskState::Running;
                self.state = TaskState::Failed;
                if first_failure {
                    return Transition::Failed;
                }
            }
            return Transition::None;
        }

        if event.progress == Some(100) && self.state == TaskState::Running {
            self.state = TaskState::Succeeded;
            return Transition::Succeeded;
        }

        Transition::None
    }

    /// Check if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Produce the immutable view handed to display surfaces.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            progress: self.progress,
            status_text: self.status_text.clone(),
            speed_text: self.speed_text.clone(),
            error_text: self.error_text.clone(),
        }
    }
}

/// Immutable view of a task for rendering a dashboard card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Unique task identifier.
    pub id: TaskId,
    /// Display label.
    pub name: String,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Last reported completion percentage.
    pub progress: u8,
    /// Last reported status label.
    pub status_text: Option<String>,
    /// Last reported throughput text.
    pub speed_text: Option<String>,
    /// Failure description; rendered in place of the status text on a
    /// Failed card.
    pub error_text: Option<String>,
}

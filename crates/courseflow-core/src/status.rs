//! Task lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a background task.
///
/// Transitions are monotonic: `Running -> Succeeded` or `Running -> Failed`,
/// exactly once per task. A terminal task never returns to `Running`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task worker is still executing.
    #[default]
    Running,
    /// Task completed successfully.
    Succeeded,
    /// Task failed; the record carries the error text.
    Failed,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the task is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_default_is_running() {
        assert_eq!(TaskState::default(), TaskState::Running);
        assert!(TaskState::default().is_active());
    }
}

//! Progress events emitted by running task workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable progress envelope emitted by a worker.
///
/// Every field other than the capture timestamp is independently optional:
/// a worker reports only what changed, and the board applies each present
/// field last-write-wins. Built with the `with_*` methods:
///
/// ```
/// use courseflow_core::ProgressEvent;
///
/// let event = ProgressEvent::new()
///     .with_progress(40)
///     .with_status("Downloading syllabus")
///     .with_speed("120 KB/s");
/// assert!(!event.is_terminal());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion percentage, 0-100. 100 marks success unless an error
    /// was also recorded.
    pub progress: Option<u8>,
    /// Short status label ("Uploading...", "Completed").
    pub status: Option<String>,
    /// Throughput text ("120 KB/s"), display-only.
    pub speed: Option<String>,
    /// Longer free-form detail line.
    pub detail: Option<String>,
    /// Failure description; a non-empty value makes the task Failed.
    pub error: Option<String>,
    /// When the worker captured this update.
    pub captured_at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an empty event stamped with the current time.
    pub fn new() -> Self {
        Self {
            captured_at: Utc::now(),
            ..Self::default()
        }
    }

    /// Set the completion percentage. Values above 100 are clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Set the status label.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set the throughput text.
    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(speed.into());
        self
    }

    /// Set the detail line.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the error text. An empty string is treated as no error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        if !error.is_empty() {
            self.error = Some(error);
        }
        self
    }

    /// True if no field besides the timestamp is present.
    pub fn is_empty(&self) -> bool {
        self.progress.is_none()
            && self.status.is_none()
            && self.speed.is_none()
            && self.detail.is_none()
            && self.error.is_none()
    }

    /// True if the event carries neither progress nor status nor an error.
    /// Such events only refresh display text and may be rate-limited away.
    pub fn is_noop(&self) -> bool {
        self.progress.is_none() && self.status.is_none() && self.error.is_none()
    }

    /// True if this event ends the task: 100% progress or an error.
    /// Terminal events must never be dropped by a rate limiter.
    pub fn is_terminal(&self) -> bool {
        self.progress == Some(100) || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_clamped() {
        let event = ProgressEvent::new().with_progress(250);
        assert_eq!(event.progress, Some(100));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_empty_error_ignored() {
        let event = ProgressEvent::new().with_error("");
        assert_eq!(event.error, None);
        assert!(event.is_empty());
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_noop_detection() {
        let event = ProgressEvent::new().with_detail("parsed 3 bookmarks");
        assert!(event.is_noop());
        assert!(!event.is_empty());

        let event = ProgressEvent::new().with_status("Logging in");
        assert!(!event.is_noop());
    }

    #[test]
    fn test_error_is_terminal() {
        let event = ProgressEvent::new().with_error("portal session expired");
        assert!(event.is_terminal());
        assert_eq!(event.progress, None);
    }

    #[test]
    fn test_serialize_roundtrip_fields() {
        let event = ProgressEvent::new()
            .with_progress(75)
            .with_status("Uploading answers");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"progress\":75"));
        assert!(json.contains("Uploading answers"));
    }
}

//! Progress reporting handle passed into running task workers.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use courseflow_core::{ProgressEvent, TaskError, TaskId};

use crate::board::BoardMessage;

/// Minimum interval between forwarded non-terminal events per emitter.
/// Terminal events (100% progress or an error) always pass through.
pub const MIN_EMIT_INTERVAL: Duration = Duration::from_millis(50);

/// Where an emitter delivers its events.
enum Sink {
    /// Bound to a board: events cross to the owning thread via the channel.
    Board(mpsc::UnboundedSender<BoardMessage>),
    /// Standalone/headless: events render to the terminal directly.
    Console(Mutex<ConsoleLine>),
}

/// Rolling state for the single rewritten console line.
struct ConsoleLine {
    status: String,
    progress: u8,
    speed: String,
    line_open: bool,
}

impl ConsoleLine {
    fn new() -> Self {
        Self {
            status: String::new(),
            progress: 0,
            speed: String::new(),
            line_open: false,
        }
    }
}

/// Lightweight helper handed to a running task.
///
/// Converts task-reported milestones into a bounded-rate stream of
/// [`ProgressEvent`]s addressed to the bound task, and carries the task's
/// cooperative cancellation token so the work can poll for a stop request
/// at safe points. Reporting faults (a closed board channel) are logged
/// and swallowed; they must never abort the task's own work.
pub struct ProgressEmitter {
    task_id: TaskId,
    sink: Sink,
    cancel: CancellationToken,
    started: Instant,
    last_sent: Mutex<Option<Instant>>,
}

impl ProgressEmitter {
    /// Create an emitter bound to a board channel. Built by the dispatcher.
    pub(crate) fn bound(
        task_id: TaskId,
        tx: mpsc::UnboundedSender<BoardMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            sink: Sink::Board(tx),
            cancel,
            started: Instant::now(),
            last_sent: Mutex::new(None),
        }
    }

    /// Create a standalone emitter with no board attached.
    ///
    /// For headless use (scripts, CLI smoke runs): errors go to stderr,
    /// details print as bare lines, and other updates rewrite a single
    /// `status (progress%) speed` line in place, with the trailing newline
    /// written only by the terminal event.
    pub fn console() -> Self {
        Self {
            task_id: TaskId::generate(),
            sink: Sink::Console(Mutex::new(ConsoleLine::new())),
            cancel: CancellationToken::new(),
            started: Instant::now(),
            last_sent: Mutex::new(None),
        }
    }

    /// The task this emitter reports for.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wall-clock seconds since this emitter was created. Pure.
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// True once a cooperative stop has been requested for this task.
    /// Workers poll this at safe points; honoring it is their choice.
    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when a cooperative stop is requested.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Forward a progress event, subject to rate limiting.
    ///
    /// A forwarding failure is logged and swallowed; a reporting fault
    /// must never abort the task's own work. Workers that want to react
    /// to board shutdown use [`ProgressEmitter::try_update`] instead.
    pub fn update(&self, event: ProgressEvent) {
        if let Err(err) = self.try_update(event) {
            warn!(task_id = %self.task_id, "progress event dropped: {err}");
        }
    }

    /// Fallible variant of [`ProgressEmitter::update`].
    ///
    /// An event is dropped (with `Ok`) when less than [`MIN_EMIT_INTERVAL`]
    /// has elapsed since the last forwarded event, unless it is terminal
    /// (100% progress or a non-empty error) - terminal updates are never
    /// silently dropped. Events with no fields at all are always dropped.
    /// Returns [`TaskError::BoardClosed`] when bound to a board whose
    /// channel has shut down.
    pub fn try_update(&self, event: ProgressEvent) -> Result<(), TaskError> {
        if event.is_empty() {
            return Ok(());
        }
        if !event.is_terminal() && !self.throttle_allows() {
            return Ok(());
        }
        self.forward(event)
    }

    /// Convenience for `update(progress = 100, status = "Completed")`.
    pub fn finish(&self) {
        self.finish_with_status("Completed");
    }

    /// Terminal success update with a custom status label.
    pub fn finish_with_status(&self, status: impl Into<String>) {
        self.update(ProgressEvent::new().with_progress(100).with_status(status));
    }

    /// Convenience for `update(error = ...)`.
    pub fn fail(&self, error: impl Into<String>) {
        self.update(ProgressEvent::new().with_error(error));
    }

    /// Check the rate limiter and claim the window if open.
    fn throttle_allows(&self) -> bool {
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(last) = *last_sent {
            if last.elapsed() < MIN_EMIT_INTERVAL {
                return false;
            }
        }
        *last_sent = Some(Instant::now());
        true
    }

    fn forward(&self, event: ProgressEvent) -> Result<(), TaskError> {
        match &self.sink {
            Sink::Board(tx) => {
                let message = BoardMessage::Progress {
                    id: self.task_id.clone(),
                    event,
                };
                // Board gone means the work keeps running unobserved.
                tx.send(message).map_err(|_| TaskError::BoardClosed)
            }
            Sink::Console(line) => {
                let mut line = match line.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                render_console(&mut line, &event, &mut io::stdout(), &mut io::stderr());
                Ok(())
            }
        }
    }
}

/// Render one event onto the terminal for a standalone emitter.
fn render_console<W: Write, E: Write>(
    line: &mut ConsoleLine,
    event: &ProgressEvent,
    out: &mut W,
    err: &mut E,
) {
    // A detail always prints as its own bare line, whatever else the
    // event carries.
    if let Some(detail) = &event.detail {
        if line.line_open {
            let _ = writeln!(out);
            line.line_open = false;
        }
        let _ = writeln!(out, "{detail}");
    }

    if let Some(error) = &event.error {
        if line.line_open {
            let _ = writeln!(out);
            line.line_open = false;
        }
        let _ = writeln!(err, "{error}");
        return;
    }

    if event.progress.is_none() && event.status.is_none() && event.speed.is_none() {
        return;
    }

    if let Some(progress) = event.progress {
        line.progress = progress;
    }
    if let Some(status) = &event.status {
        line.status = status.clone();
    }
    if let Some(speed) = &event.speed {
        line.speed = speed.clone();
    }

    let _ = write!(out, "\r{} ({}%) {}", line.status, line.progress, line.speed);
    let _ = out.flush();
    line.line_open = true;

    // Trailing newline only once the task is done.
    if event.progress == Some(100) {
        let _ = writeln!(out);
        line.line_open = false;
    }
}

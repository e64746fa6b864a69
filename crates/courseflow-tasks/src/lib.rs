//! Courseflow Task Orchestration
//!
//! Runs arbitrary long-running units of work (portal scraping, LLM calls,
//! uploads) off the interactive thread and feeds a single consumer with
//! live, ordered, rate-limited progress:
//!
//! - [`Dispatcher`] spawns one worker per task and guarantees a terminal
//!   notification for both normal completion and unhandled failure.
//! - [`ProgressEmitter`] is handed to the running work; it forwards
//!   milestones to the board, throttled to one event per 50ms unless the
//!   event is terminal.
//! - [`TaskRegistry`] tracks active tasks and delivers cooperative
//!   cancellation signals.
//! - [`TaskBoard`] is the single consumer that owns all visible task state
//!   and invokes each task's completion callback exactly once.
//!
//! ```no_run
//! use courseflow_tasks::TaskBoard;
//!
//! # async fn demo() {
//! let mut board = TaskBoard::new();
//! let dispatcher = board.dispatcher();
//!
//! dispatcher.start_with(
//!     "Fetch assignments",
//!     |emitter| async move {
//!         emitter.update(courseflow_tasks::ProgressEvent::new()
//!             .with_progress(50)
//!             .with_status("Scraping course list"));
//!         emitter.finish();
//!         Ok(())
//!     },
//!     || println!("done"),
//! );
//!
//! // On the owning thread, e.g. each UI tick:
//! board.process_pending();
//! # }
//! ```

pub mod board;
pub mod dispatcher;
pub mod emitter;
pub mod registry;

// Re-export commonly used types
pub use board::{BoardMessage, SuccessCallback, TaskBoard};
pub use dispatcher::Dispatcher;
pub use emitter::ProgressEmitter;
pub use registry::{ActiveTaskSnapshot, TaskRegistry};

// Core domain types, re-exported for callers
pub use courseflow_core::{ProgressEvent, TaskError, TaskId, TaskSnapshot, TaskState, WorkError};

//! Courseflow Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The async runtime
//! - Channels or threads
//! - Any UI surface
//!
//! All types here describe background tasks and the progress events they
//! report while running.

pub mod error;
pub mod event;
pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::{TaskError, WorkError};
pub use event::ProgressEvent;
pub use ids::TaskId;
pub use status::TaskState;
pub use task::{TaskRecord, TaskSnapshot, Transition};

//! Task engine: hierarchical, cancellable work with live progress.
//!
//! A [`Task`] wraps a work function and runs it once under an explicit
//! [`TaskContext`]. While it runs, the work function reports through its
//! [`TaskScope`]; views observe through a [`TaskHandle`]:
//! - progress and the two message lines are conflated (latest value wins)
//! - independent sub-tasks are published in spawn order, never coalesced
//! - a main sub-task drives the parent's own progress and messages
//!
//! Termination always runs the finalizer: done message resolved, progress
//! forced to 1.0, all of the task's streams closed.

mod context;
mod handle;
mod progress;
mod scope;
#[allow(clippy::module_inception)]
mod task;
mod types;

pub use context::TaskContext;
pub use handle::TaskHandle;
pub use scope::TaskScope;
pub use task::{DoneMessagePolicy, Task};
pub use types::{TaskError, TaskId, TaskKind, TaskOutcome, TaskSnapshot, TaskStatus};

//! # gamelib runtime
//!
//! Reactive task and collection runtime for a game library manager.
//!
//! This library provides:
//! - Hierarchical, cancellable tasks with live progress, two message lines,
//!   sub-task composition, and a guaranteed finalizer
//! - Observable lists with a snapshot stream, an ordered change stream,
//!   buffered batching, and live derived views
//!
//! ## Architecture
//!
//! ```text
//!   TaskContext (cancel token) ──────────────┬───────────────────────┐
//!                                            ▼                       ▼
//!   ┌──────────────────────────┐    ┌─────────────────┐    ┌─────────────────────┐
//!   │ Task::run                │    │ ObservableList  │    │ ListView::mapping / │
//!   │  work(TaskScope) ──────► │    │  add/remove/set │───►│ filtering / sorting │
//!   │  Finalizer on every exit │    │  Buffer guard   │    │ (one tokio task     │
//!   └────────────┬─────────────┘    └────────┬────────┘    │  per derived view)  │
//!                │                           │             └─────────────────────┘
//!                ▼                           ▼
//!   TaskHandle: progress, messages,   ListView: snapshots (conflated),
//!   sub-tasks (replayed), done        changes (lossless, ordered)
//! ```
//!
//! ## Task Flow
//! 1. Build a [`Task`] from a title, a [`TaskKind`] and a work function
//! 2. Run it under a [`TaskContext`]; the work reports through its [`TaskScope`]
//! 3. Views observe the [`TaskHandle`] streams
//! 4. Termination resolves the done message and closes every stream
//!
//! ## Modules
//! - `channel`: conflated and fan-out broadcast primitives
//! - `task`: the task engine
//! - `list`: observable lists and derived views
//! - `config`: environment configuration for the demo binary

pub mod channel;
pub mod config;
pub mod list;
pub mod task;

pub use config::Config;
pub use list::{ChangeEvent, ListError, ListView, ObservableList};
pub use task::{Task, TaskContext, TaskError, TaskHandle, TaskKind, TaskScope, TaskStatus};

//! Identifiers, lifecycle states and errors of the task engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
///
/// # Properties
/// - Globally unique within a process
/// - Immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a view should present a task.
///
/// Metadata only: the engine runs every kind the same way. A view uses it to
/// decide whether to offer a cancel affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Short operation, usually shown inline.
    Quick,
    /// Long-running operation with a progress bar and cancel button.
    Long,
    /// Operation the user must not interrupt.
    NonCancellable,
}

impl TaskKind {
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, TaskKind::NonCancellable)
    }
}

/// How a finished task terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// Lifecycle of a task.
///
/// # State Machine
/// ```text
/// Created -> Running -> Terminated(Succeeded | Failed | Cancelled)
/// ```
/// A task never leaves `Terminated` and never runs twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Running,
    Terminated(TaskOutcome),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Terminated(_))
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self {
            TaskStatus::Terminated(outcome) => Some(*outcome),
            TaskStatus::Created | TaskStatus::Running => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::Terminated(TaskOutcome::Succeeded) => "succeeded",
            TaskStatus::Terminated(TaskOutcome::Failed) => "failed",
            TaskStatus::Terminated(TaskOutcome::Cancelled) => "cancelled",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TaskStatus::Created => 0,
            TaskStatus::Running => 1,
            TaskStatus::Terminated(TaskOutcome::Succeeded) => 2,
            TaskStatus::Terminated(TaskOutcome::Failed) => 3,
            TaskStatus::Terminated(TaskOutcome::Cancelled) => 4,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskStatus::Created,
            1 => TaskStatus::Running,
            2 => TaskStatus::Terminated(TaskOutcome::Succeeded),
            3 => TaskStatus::Terminated(TaskOutcome::Failed),
            _ => TaskStatus::Terminated(TaskOutcome::Cancelled),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the task engine.
///
/// `AlreadyStarted` and `TotalWorkNotSet` are caller bugs. `Failed` carries
/// whatever the work function returned; the engine never retries it.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task '{title}' was already started")]
    AlreadyStarted { title: String },

    #[error("Task '{title}' reported progress before setting total work")]
    TotalWorkNotSet { title: String },

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Point-in-time view of a task and its spawned sub-tasks, for views and IPC.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub title: String,
    pub kind: TaskKind,
    pub status: String,
    pub processed: u64,
    pub total_work: Option<u64>,
    pub progress: f64,
    pub message1: String,
    pub message2: String,
    pub done_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskSnapshot>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_discriminants_round_trip() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Running,
            TaskStatus::Terminated(TaskOutcome::Succeeded),
            TaskStatus::Terminated(TaskOutcome::Failed),
            TaskStatus::Terminated(TaskOutcome::Cancelled),
        ] {
            assert_eq!(TaskStatus::from_u8(status.to_u8()), status);
        }
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Created.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Terminated(TaskOutcome::Failed).is_terminal());
        assert_eq!(TaskStatus::Running.outcome(), None);
        assert_eq!(
            TaskStatus::Terminated(TaskOutcome::Cancelled).to_string(),
            "cancelled"
        );
    }

    #[test]
    fn test_kind_cancellable() {
        assert!(TaskKind::Quick.is_cancellable());
        assert!(TaskKind::Long.is_cancellable());
        assert!(!TaskKind::NonCancellable.is_cancellable());
    }

    #[test]
    fn test_error_messages() {
        let err = TaskError::AlreadyStarted {
            title: "Import".to_string(),
        };
        assert_eq!(err.to_string(), "Task 'Import' was already started");

        let err = TaskError::Failed(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "Task failed: disk full");
        assert!(!err.is_cancelled());
        assert!(TaskError::Cancelled.is_cancelled());
    }
}

//! Observable state of a single task.
//!
//! [`TaskHandle`] is the read side handed to views: it exposes the conflated
//! progress/message channels, the ordered sub-task stream and the done
//! message. The write side lives on [`TaskScope`](super::TaskScope) and the
//! lifecycle on [`Task`](super::Task); both share one `TaskShared`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use super::types::{TaskError, TaskId, TaskKind, TaskOutcome, TaskSnapshot, TaskStatus};
use crate::channel::{lock, Conflated, Fanout};

#[derive(Debug, Default)]
struct ProgressCounter {
    processed: u64,
    total: Option<u64>,
}

pub(crate) struct TaskShared {
    pub(crate) id: TaskId,
    pub(crate) title: String,
    pub(crate) kind: TaskKind,
    status: AtomicU8,
    counter: Mutex<ProgressCounter>,
    pub(crate) progress: Conflated<f64>,
    pub(crate) message1: Conflated<String>,
    pub(crate) message2: Conflated<String>,
    pub(crate) sub_tasks: Fanout<TaskHandle>,
    done: watch::Sender<Option<String>>,
}

impl TaskShared {
    pub(crate) fn new(title: String, kind: TaskKind) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            id: TaskId::new(),
            title,
            kind,
            status: AtomicU8::new(TaskStatus::Created.to_u8()),
            counter: Mutex::new(ProgressCounter::default()),
            progress: Conflated::new(0.0),
            message1: Conflated::new(String::new()),
            message2: Conflated::new(String::new()),
            sub_tasks: Fanout::with_replay(),
            done,
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    /// Reset accounting: `processed = 0`, `total = n`, `progress = 0.0`.
    pub(crate) fn set_total_work(&self, total: u64) {
        let mut counter = lock(&self.counter);
        counter.processed = 0;
        counter.total = Some(total);
        self.progress.set(0.0);
    }

    /// Advance by `amount` and publish `processed / total`.
    pub(crate) fn increment(&self, amount: u64) -> Result<f64, TaskError> {
        let mut counter = lock(&self.counter);
        let total = counter.total.ok_or_else(|| TaskError::TotalWorkNotSet {
            title: self.title.clone(),
        })?;
        counter.processed = counter.processed.saturating_add(amount);
        let progress = if total == 0 {
            1.0
        } else {
            (counter.processed as f64 / total as f64).min(1.0)
        };
        self.progress.set(progress);
        Ok(progress)
    }

    /// Terminal transition. Only the run guard calls this, once per task.
    pub(crate) fn finalize(&self, outcome: TaskOutcome, done_message: String) {
        self.set_status(TaskStatus::Terminated(outcome));
        self.progress.set(1.0);
        self.message1.close();
        self.message2.close();
        self.progress.close();
        self.sub_tasks.close();
        // Resolved last so that anyone awaiting it sees the final state.
        let resolved = self.done.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(done_message);
                true
            } else {
                false
            }
        });
        if !resolved {
            tracing::error!(task_id = %self.id, "Done message resolved twice");
        }
    }
}

/// Cloneable, read-only view of a task.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub(crate) fn new(shared: Arc<TaskShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn kind(&self) -> TaskKind {
        self.shared.kind
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.status()
    }

    pub fn progress(&self) -> f64 {
        self.shared.progress.get()
    }

    pub fn processed_count(&self) -> u64 {
        lock(&self.shared.counter).processed
    }

    pub fn total_work(&self) -> Option<u64> {
        lock(&self.shared.counter).total
    }

    pub fn message1(&self) -> String {
        self.shared.message1.get()
    }

    pub fn message2(&self) -> String {
        self.shared.message2.get()
    }

    /// Latest-value progress stream in `[0, 1]`. Closed when the task ends.
    pub fn progress_channel(&self) -> watch::Receiver<f64> {
        self.shared.progress.subscribe()
    }

    pub fn message1_channel(&self) -> watch::Receiver<String> {
        self.shared.message1.subscribe()
    }

    pub fn message2_channel(&self) -> watch::Receiver<String> {
        self.shared.message2.subscribe()
    }

    /// Every independent sub-task, in spawn order, starting with the ones
    /// already spawned. The stream ends after the task terminates.
    pub fn sub_tasks(&self) -> mpsc::UnboundedReceiver<TaskHandle> {
        self.shared.sub_tasks.subscribe()
    }

    /// Independent sub-tasks spawned so far, in spawn order.
    pub fn children(&self) -> Vec<TaskHandle> {
        self.shared.sub_tasks.history()
    }

    /// Whether the task's own streams are closed (it has terminated).
    pub fn is_closed(&self) -> bool {
        self.shared.progress.is_closed()
            && self.shared.message1.is_closed()
            && self.shared.message2.is_closed()
            && self.shared.sub_tasks.is_closed()
    }

    /// Wait for the summary line resolved when the task terminates.
    pub async fn done_message(&self) -> String {
        let mut rx = self.shared.done.subscribe();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(message) => message.clone(),
            Err(_) => None,
        };
        resolved.unwrap_or_default()
    }

    pub fn try_done_message(&self) -> Option<String> {
        self.shared.done.borrow().clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let (processed, total_work) = {
            let counter = lock(&self.shared.counter);
            (counter.processed, counter.total)
        };
        TaskSnapshot {
            id: self.id(),
            title: self.shared.title.clone(),
            kind: self.shared.kind,
            status: self.status().as_str().to_string(),
            processed,
            total_work,
            progress: self.progress(),
            message1: self.message1(),
            message2: self.message2(),
            done_message: self.try_done_message(),
            children: self.children().iter().map(TaskHandle::snapshot).collect(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("title", &self.shared.title)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish()
    }
}

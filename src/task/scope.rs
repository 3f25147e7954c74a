//! Work-side API handed to a task's work function.

use std::sync::Arc;

use tokio::sync::watch;

use super::context::TaskContext;
use super::handle::{TaskHandle, TaskShared};
use super::task::Task;
use super::types::TaskError;
use crate::channel::Conflated;

/// The executing task plus the context it runs under.
///
/// Passed by value to the work function in place of an implicit receiver, so
/// the function can report progress and spawn sub-tasks that inherit the
/// same cancellation token.
#[derive(Clone)]
pub struct TaskScope {
    handle: TaskHandle,
    ctx: TaskContext,
}

impl TaskScope {
    pub(crate) fn new(handle: TaskHandle, ctx: TaskContext) -> Self {
        Self { handle, ctx }
    }

    fn shared(&self) -> &Arc<TaskShared> {
        &self.handle.shared
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.ctx.cancelled().await
    }

    /// Start counting towards `total`; resets processed count and progress.
    pub fn set_total_work(&self, total: u64) {
        self.shared().set_total_work(total);
    }

    /// Count one processed unit.
    ///
    /// # Errors
    /// `TaskError::TotalWorkNotSet` if `set_total_work` was never called.
    pub fn increment_progress(&self) -> Result<f64, TaskError> {
        self.shared().increment(1)
    }

    pub fn increment_progress_by(&self, amount: u64) -> Result<f64, TaskError> {
        self.shared().increment(amount)
    }

    /// Publish a progress value directly, clamped to `[0, 1]`.
    pub fn set_progress(&self, progress: f64) {
        self.shared().progress.set(progress.clamp(0.0, 1.0));
    }

    pub fn set_message1(&self, message: impl Into<String>) {
        self.shared().message1.set(message.into());
    }

    pub fn set_message2(&self, message: impl Into<String>) {
        self.shared().message2.set(message.into());
    }

    /// Run `child` as an independent sub-task.
    ///
    /// The child is published on this task's sub-task stream before it
    /// starts, then runs to completion on the caller's execution context. Its
    /// progress and messages stay its own.
    pub async fn run_sub_task<R>(&self, mut child: Task<R>) -> Result<R, TaskError> {
        tracing::debug!(
            parent = %self.handle.id(),
            child = %child.handle().id(),
            title = %child.handle().title(),
            "Spawning sub-task"
        );
        self.shared().sub_tasks.publish(child.handle());
        child.run(&self.ctx.child_context()).await
    }

    /// Run `child` as this task's main sub-task.
    ///
    /// This task's progress and messages are reset, then track the child's
    /// for as long as it runs. Afterwards message2 holds the child's done
    /// message. The child is not published on the sub-task stream.
    pub async fn run_main_task<R>(&self, mut child: Task<R>) -> Result<R, TaskError> {
        let parent = self.shared();
        parent.progress.set(0.0);
        parent.message1.set(String::new());
        parent.message2.set(String::new());

        let child_handle = child.handle();
        tracing::debug!(
            parent = %self.handle.id(),
            child = %child_handle.id(),
            title = %child_handle.title(),
            "Delegating to main sub-task"
        );

        // Subscribe before the child is first polled.
        let progress = child_handle.progress_channel();
        let message1 = child_handle.message1_channel();
        let message2 = child_handle.message2_channel();
        let bind = async {
            futures::join!(
                forward(progress, &parent.progress),
                forward(message1, &parent.message1),
                forward(message2, &parent.message2),
            );
        };
        let ctx = self.ctx.child_context();
        let (result, ()) = futures::join!(child.run(&ctx), bind);

        parent.message2.set(child_handle.done_message().await);
        result
    }
}

/// Copy every value `source` yields into `target` until `source` closes.
async fn forward<T: Clone>(mut source: watch::Receiver<T>, target: &Conflated<T>) {
    while source.changed().await.is_ok() {
        let value = source.borrow_and_update().clone();
        target.set(value);
    }
}

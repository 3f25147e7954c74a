//! Core Task type: a single-run, cancellable unit of work.
//!
//! # Invariants
//! - `run()` executes the work function at most once
//! - Every started task terminates through the finalizer exactly once, on
//!   success, failure, cancellation, or when the `run()` future is dropped

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::Instrument;

use super::context::TaskContext;
use super::handle::{TaskHandle, TaskShared};
use super::scope::TaskScope;
use super::types::{TaskError, TaskKind, TaskOutcome, TaskStatus};

type WorkFn<T> = Box<dyn FnOnce(TaskScope) -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// Maps `success` to the summary line resolved as the done message.
pub type DoneMessagePolicy = Arc<dyn Fn(bool) -> String + Send + Sync>;

fn default_done_message(success: bool) -> String {
    if success { "Done" } else { "Cancelled" }.to_string()
}

/// A cancellable, progress-reporting unit of work producing a `T`.
///
/// Observers hold a [`TaskHandle`] (see [`Task::handle`]); the owner calls
/// [`Task::run`] once.
pub struct Task<T> {
    handle: TaskHandle,
    work: Option<WorkFn<T>>,
    done_message: DoneMessagePolicy,
}

impl<T: Send + 'static> Task<T> {
    /// Create a task in the `Created` state.
    ///
    /// `work` receives a [`TaskScope`] for reporting progress, updating
    /// messages, and running sub-tasks.
    pub fn new<F, Fut>(title: impl Into<String>, kind: TaskKind, work: F) -> Self
    where
        F: FnOnce(TaskScope) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = Arc::new(TaskShared::new(title.into(), kind));
        Self {
            handle: TaskHandle::new(shared),
            work: Some(Box::new(move |scope| work(scope).boxed())),
            done_message: Arc::new(default_done_message),
        }
    }

    /// Replace the default "Done" / "Cancelled" summary.
    pub fn with_done_message(mut self, policy: impl Fn(bool) -> String + Send + Sync + 'static) -> Self {
        self.done_message = Arc::new(policy);
        self
    }
}

impl<T> Task<T> {
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.handle.status()
    }

    /// Execute the work function under `ctx`.
    ///
    /// # Errors
    /// - `AlreadyStarted` on every call after the first
    /// - `Cancelled` if `ctx` is cancelled before the work finishes
    /// - `Failed` with the work function's error
    ///
    /// The finalizer has run by the time any of these is returned.
    pub async fn run(&mut self, ctx: &TaskContext) -> Result<T, TaskError> {
        let Some(work) = self.work.take() else {
            tracing::warn!(task_id = %self.handle.id(), "Task run twice");
            return Err(TaskError::AlreadyStarted {
                title: self.handle.title().to_string(),
            });
        };

        let span = tracing::debug_span!(
            "task",
            task_id = %self.handle.id(),
            title = %self.handle.title(),
            kind = ?self.handle.kind(),
            depth = ctx.depth(),
        );

        self.handle.shared.set_status(TaskStatus::Running);
        let mut finalizer = Finalizer {
            handle: self.handle.clone(),
            done_message: Arc::clone(&self.done_message),
            outcome: TaskOutcome::Cancelled,
        };
        let scope = TaskScope::new(self.handle.clone(), ctx.clone());

        let result = async {
            tracing::debug!("Task started");
            let result = tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(TaskError::Cancelled),
                res = work(scope) => res.map_err(|err| classify(err, ctx)),
            };
            match &result {
                Ok(_) => tracing::info!("Task completed"),
                Err(TaskError::Cancelled) => tracing::info!("Task cancelled"),
                Err(err) => tracing::warn!(error = %err, "Task failed"),
            }
            result
        }
        .instrument(span)
        .await;

        finalizer.outcome = match &result {
            Ok(_) => TaskOutcome::Succeeded,
            Err(TaskError::Cancelled) => TaskOutcome::Cancelled,
            Err(_) => TaskOutcome::Failed,
        };
        drop(finalizer);
        result
    }
}

/// A work error counts as cancellation when the context was cancelled or a
/// sub-task's cancellation bubbled up through `?`.
fn classify(err: anyhow::Error, ctx: &TaskContext) -> TaskError {
    let bubbled = matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Cancelled));
    if bubbled || ctx.is_cancelled() {
        TaskError::Cancelled
    } else {
        TaskError::Failed(err)
    }
}

/// Runs the terminal transition when dropped, so an aborted `run()` future
/// still resolves the done message and closes the task's streams.
struct Finalizer {
    handle: TaskHandle,
    done_message: DoneMessagePolicy,
    outcome: TaskOutcome,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let message = (self.done_message)(self.outcome.is_success());
        tracing::debug!(
            task_id = %self.handle.id(),
            outcome = ?self.outcome,
            done = %message,
            "Task finalized"
        );
        self.handle.shared.finalize(self.outcome, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskHandle;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    fn assert_finalized(handle: &TaskHandle) {
        assert!(handle.try_done_message().is_some());
        assert_eq!(handle.progress(), 1.0);
        assert!(handle.is_closed());
        assert!(handle.status().is_terminal());
    }

    #[tokio::test]
    async fn test_copy_three_items() {
        let items = vec!["a", "b", "c"];
        let mut task = Task::new("Copy", TaskKind::Quick, move |scope| async move {
            scope.set_total_work(items.len() as u64);
            let mut copied = Vec::new();
            for item in items {
                copied.push(item.to_uppercase());
                scope.increment_progress()?;
            }
            Ok(copied)
        });
        let handle = task.handle();

        let copied = assert_ok!(task.run(&TaskContext::new()).await);
        assert_eq!(copied, vec!["A", "B", "C"]);
        assert_eq!(handle.processed_count(), 3);
        assert_eq!(handle.progress(), 1.0);
        assert_eq!(handle.done_message().await, "Done");
        assert_eq!(handle.status(), TaskStatus::Terminated(TaskOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_second_run_fails_after_success() {
        let mut task = Task::new("Once", TaskKind::Quick, |_| async { Ok(1) });
        let ctx = TaskContext::new();

        assert_eq!(assert_ok!(task.run(&ctx).await), 1);
        let err = assert_err!(task.run(&ctx).await);
        assert!(matches!(err, TaskError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_second_run_fails_after_failure() {
        let mut task: Task<()> =
            Task::new("Broken", TaskKind::Long, |_| async { anyhow::bail!("scraper offline") });
        let ctx = TaskContext::new();

        let err = assert_err!(task.run(&ctx).await);
        assert!(matches!(err, TaskError::Failed(_)));
        assert!(matches!(
            task.run(&ctx).await,
            Err(TaskError::AlreadyStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_run_fails_after_cancel() {
        let ctx = TaskContext::new();
        ctx.cancel();
        let mut task = Task::new("Cancelled early", TaskKind::Long, |_| async { Ok(()) });

        assert!(matches!(task.run(&ctx).await, Err(TaskError::Cancelled)));
        assert!(matches!(
            task.run(&ctx).await,
            Err(TaskError::AlreadyStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_runs_finalizer() {
        let mut task: Task<()> = Task::new("Export", TaskKind::Long, |scope| async move {
            scope.set_total_work(10);
            scope.increment_progress()?;
            anyhow::bail!("write failed")
        });
        let handle = task.handle();

        let err = task.run(&TaskContext::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Task failed: write failed");
        assert_finalized(&handle);
        assert_eq!(handle.done_message().await, "Cancelled");
        assert_eq!(handle.status(), TaskStatus::Terminated(TaskOutcome::Failed));
    }

    #[tokio::test]
    async fn test_cancellation_runs_finalizer() {
        let ctx = TaskContext::new();
        let (started_tx, started_rx) = oneshot::channel();
        let mut task: Task<()> = Task::new("Sync provider", TaskKind::Long, |scope| async move {
            scope.set_total_work(100);
            let _ = started_tx.send(());
            std::future::pending::<()>().await;
            Ok(())
        });
        let handle = task.handle();

        let run_ctx = ctx.clone();
        let join = tokio::spawn(async move { task.run(&run_ctx).await });
        started_rx.await.unwrap();
        ctx.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("run should observe cancellation")
            .unwrap();
        assert!(matches!(result, Err(TaskError::Cancelled)));
        assert_finalized(&handle);
        assert_eq!(handle.status(), TaskStatus::Terminated(TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_run_future_still_finalizes() {
        let mut task: Task<()> = Task::new("Aborted", TaskKind::Long, |_| async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let handle = task.handle();

        let join = tokio::spawn(async move { task.run(&TaskContext::new()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        join.abort();
        let _ = join.await;

        assert_finalized(&handle);
        assert_eq!(handle.done_message().await, "Cancelled");
    }

    #[tokio::test]
    async fn test_custom_done_message() {
        let mut task = Task::new("Detect duplicates", TaskKind::Quick, |_| async { Ok(7usize) })
            .with_done_message(|success| {
                if success {
                    "Found duplicates".to_string()
                } else {
                    "Duplicate detection aborted".to_string()
                }
            });
        let handle = task.handle();

        assert_ok!(task.run(&TaskContext::new()).await);
        assert_eq!(handle.done_message().await, "Found duplicates");
    }

    #[tokio::test]
    async fn test_increment_before_total_is_reported() {
        let mut task: Task<()> = Task::new("Careless", TaskKind::Quick, |scope| async move {
            scope.increment_progress()?;
            Ok(())
        });

        let err = task.run(&TaskContext::new()).await.unwrap_err();
        assert!(err.to_string().contains("before setting total work"));
    }

    #[tokio::test]
    async fn test_sub_tasks_stream_in_spawn_order() {
        let mut task = Task::new("Import", TaskKind::Long, |scope| async move {
            let mut sum = 0;
            for i in 1..=3 {
                let child = Task::new(format!("Batch {i}"), TaskKind::Quick, move |child| async move {
                    child.set_message1(format!("batch {i}"));
                    Ok(i)
                });
                sum += scope.run_sub_task(child).await?;
            }
            Ok(sum)
        });
        let handle = task.handle();
        let mut subs = handle.sub_tasks();

        assert_eq!(assert_ok!(task.run(&TaskContext::new()).await), 6);

        let mut titles = Vec::new();
        while let Some(child) = subs.recv().await {
            assert!(child.status().is_terminal());
            assert_eq!(child.done_message().await, "Done");
            titles.push(child.title().to_string());
        }
        assert_eq!(titles, vec!["Batch 1", "Batch 2", "Batch 3"]);
        // Independent sub-tasks do not drive the parent's messages.
        assert_eq!(handle.message1(), "");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.children.len(), 3);
        assert_eq!(snapshot.children[1].message1, "batch 2");
    }

    #[tokio::test]
    async fn test_late_sub_task_subscriber_gets_replay() {
        let mut task = Task::new("Bulk", TaskKind::Long, |scope| async move {
            scope
                .run_sub_task(Task::new("only", TaskKind::Quick, |_| async { Ok(()) }))
                .await?;
            Ok(())
        });
        let handle = task.handle();
        assert_ok!(task.run(&TaskContext::new()).await);

        let mut late = handle.sub_tasks();
        assert_eq!(late.recv().await.map(|c| c.title().to_string()), Some("only".into()));
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_main_task_progress_is_bound_into_parent() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let child = Task::new("Scan", TaskKind::Long, |scope| async move {
            scope.set_message1("Scanning library");
            scope.set_progress(0.5);
            let _ = release_rx.await;
            Ok(42)
        })
        .with_done_message(|_| "Scanned 42 games".to_string());

        let (after_tx, after_rx) = oneshot::channel();
        let mut parent = Task::new("Refresh", TaskKind::Long, move |scope| async move {
            let found = scope.run_main_task(child).await?;
            let _ = after_tx.send(scope.handle().message2());
            Ok(found)
        });
        let handle = parent.handle();
        let mut progress = handle.progress_channel();

        let join = tokio::spawn(async move { parent.run(&TaskContext::new()).await });

        tokio::time::timeout(Duration::from_secs(1), progress.wait_for(|p| *p == 0.5))
            .await
            .expect("parent should mirror child progress")
            .unwrap();
        assert_eq!(handle.message1(), "Scanning library");
        assert_eq!(handle.status(), TaskStatus::Running);

        release_tx.send(()).unwrap();
        assert_eq!(join.await.unwrap().unwrap(), 42);
        assert_eq!(after_rx.await.unwrap(), "Scanned 42 games");
        // Main sub-tasks are not listed as independent children.
        assert!(handle.children().is_empty());
    }

    #[tokio::test]
    async fn test_sub_task_cancellation_bubbles_up() {
        let ctx = TaskContext::new();
        let cancel = ctx.clone();
        let mut parent: Task<()> = Task::new("Parent", TaskKind::Long, move |scope| async move {
            let child: Task<()> = Task::new("Child", TaskKind::Long, move |_| async move {
                cancel.cancel();
                std::future::pending::<()>().await;
                Ok(())
            });
            scope.run_sub_task(child).await?;
            Ok(())
        });
        let handle = parent.handle();

        assert!(matches!(parent.run(&ctx).await, Err(TaskError::Cancelled)));
        assert_finalized(&handle);
        let child = &handle.children()[0];
        assert_finalized(child);
        assert_eq!(child.status(), TaskStatus::Terminated(TaskOutcome::Cancelled));
    }
}

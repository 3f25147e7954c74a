//! Batch helpers that report progress while walking a sequence.
//!
//! Each helper sets total work to the input length once and counts one unit
//! per element, which is how bulk domain operations ("update 40 games")
//! report progress.

use std::future::Future;

use super::scope::TaskScope;

impl TaskScope {
    fn tick(&self) {
        if let Err(err) = self.increment_progress() {
            tracing::error!(error = %err, "Progress helper lost its total work");
        }
    }

    pub fn map_with_progress<I, B, F>(&self, items: I, mut f: F) -> Vec<B>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(I::Item) -> B,
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        items
            .map(|item| {
                let mapped = f(item);
                self.tick();
                mapped
            })
            .collect()
    }

    pub fn filter_with_progress<I, F>(&self, items: I, mut predicate: F) -> Vec<I::Item>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(&I::Item) -> bool,
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        let mut kept = Vec::new();
        for item in items {
            if predicate(&item) {
                kept.push(item);
            }
            self.tick();
        }
        kept
    }

    pub fn flat_map_with_progress<I, U, F>(&self, items: I, mut f: F) -> Vec<U::Item>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        U: IntoIterator,
        F: FnMut(I::Item) -> U,
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        let mut out = Vec::new();
        for item in items {
            out.extend(f(item));
            self.tick();
        }
        out
    }

    pub fn for_each_with_progress<I, F>(&self, items: I, mut f: F)
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(I::Item),
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        for item in items {
            f(item);
            self.tick();
        }
    }

    /// Await `f` for each element in order, stopping at the first error.
    pub async fn try_map_with_progress<I, B, F, Fut>(&self, items: I, mut f: F) -> anyhow::Result<Vec<B>>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = anyhow::Result<B>>,
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(f(item).await?);
            self.tick();
        }
        Ok(out)
    }

    pub async fn try_for_each_with_progress<I, F, Fut>(&self, items: I, mut f: F) -> anyhow::Result<()>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let items = items.into_iter();
        self.set_total_work(items.len() as u64);
        for item in items {
            f(item).await?;
            self.tick();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::task::{Task, TaskContext, TaskKind};
    use proptest::prelude::*;

    async fn run<T: Send + 'static>(mut task: Task<T>) -> T {
        task.run(&TaskContext::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_map_with_progress_counts_each_element() {
        let task = Task::new("Rename", TaskKind::Quick, |scope| async move {
            let names = scope.map_with_progress(vec!["doom", "quake"], |n| n.to_uppercase());
            assert_eq!(scope.handle().processed_count(), 2);
            assert_eq!(scope.handle().progress(), 1.0);
            Ok(names)
        });
        assert_eq!(run(task).await, vec!["DOOM", "QUAKE"]);
    }

    #[tokio::test]
    async fn test_filter_and_flat_map_with_progress() {
        let task = Task::new("Tags", TaskKind::Quick, |scope| async move {
            let evens = scope.filter_with_progress(1..7, |n| n % 2 == 0);
            assert_eq!(scope.handle().total_work(), Some(6));
            let tags = scope.flat_map_with_progress(vec!["rpg,indie", "fps"], |s| {
                s.split(',').map(str::to_string).collect::<Vec<_>>()
            });
            assert_eq!(scope.handle().total_work(), Some(2));
            assert_eq!(scope.handle().processed_count(), 2);
            Ok((evens, tags))
        });
        let (evens, tags) = run(task).await;
        assert_eq!(evens, vec![2, 4, 6]);
        assert_eq!(tags, vec!["rpg", "indie", "fps"]);
    }

    #[tokio::test]
    async fn test_for_each_with_progress_reports_intermediate_values() {
        let task = Task::new("Update", TaskKind::Long, |scope| async move {
            let mut seen = Vec::new();
            let handle = scope.handle().clone();
            scope.for_each_with_progress(0..4, |_| seen.push(handle.progress()));
            Ok(seen)
        });
        assert_eq!(run(task).await, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn test_try_map_with_progress_stops_at_first_error() {
        let mut task: Task<Vec<u32>> = Task::new("Fetch", TaskKind::Long, |scope| async move {
            let out = scope
                .try_map_with_progress(vec![1u32, 2, 3, 4], |id| async move {
                    if id == 3 {
                        anyhow::bail!("game {id} not found");
                    }
                    Ok(id * 10)
                })
                .await;
            assert_eq!(scope.handle().processed_count(), 2);
            out
        });
        let handle = task.handle();
        let err = task.run(&TaskContext::new()).await.unwrap_err();
        assert!(err.to_string().contains("game 3 not found"));
        assert_eq!(handle.progress(), 1.0);
    }

    #[tokio::test]
    async fn test_try_for_each_with_progress() {
        let task = Task::new("Save", TaskKind::Long, |scope| async move {
            scope
                .try_for_each_with_progress(vec!["a", "b", "c"], |_| async { Ok(()) })
                .await?;
            Ok(scope.handle().processed_count())
        });
        assert_eq!(run(task).await, 3);
    }

    proptest! {
        #[test]
        fn prop_progress_is_exact_ratio(n in 1u64..500, k_frac in 0.0f64..=1.0) {
            let k = ((n as f64) * k_frac).floor() as u64;
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let progress = rt.block_on(async move {
                let task = Task::new("ratio", TaskKind::Quick, move |scope| async move {
                    scope.set_total_work(n);
                    for _ in 0..k {
                        scope.increment_progress()?;
                    }
                    Ok(scope.handle().progress())
                });
                run(task).await
            });
            prop_assert_eq!(progress, k as f64 / n as f64);
        }
    }
}

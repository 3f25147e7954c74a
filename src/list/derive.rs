//! Live read-only views computed from a source list.
//!
//! `mapping` is incremental: each upstream [`ChangeEvent`] becomes the
//! equivalent mutation on the derived list. Filtering, sorting and
//! de-duplication have no general incremental rule, so they recompute the
//! whole derived contents with `set_all` on every upstream snapshot.
//!
//! Every derivation spawns one tokio task that owns the derived list. The task
//! ends, closing the derived streams, when the source list is dropped or the
//! supplied [`TaskContext`] is cancelled. Derivations must be created inside a
//! tokio runtime.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::watch;

use super::event::ChangeEvent;
use super::observable::ObservableList;
use super::view::ListView;
use crate::task::TaskContext;

/// Shared element predicate for [`ListView::filtering_with`].
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Shared element ordering for [`ListView::sorting_with_stream`].
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

impl<T: Clone + Send + Sync + 'static> ListView<T> {
    /// Element-wise transform, kept in sync event by event.
    pub fn mapping<R, F>(&self, ctx: &TaskContext, f: F) -> ListView<R>
    where
        R: Clone + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let (snapshot, mut changes) = self.subscribe();
        let mut derived = ObservableList::new(snapshot.iter().map(&f).collect());
        let view = derived.view();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    event = changes.recv() => match event {
                        Some(event) => apply_mapped(&mut derived, event, &f),
                        None => break,
                    },
                }
            }
            tracing::trace!(len = derived.len(), "Mapped view detached");
        });
        view
    }

    /// Elements matching `predicate`, in source order.
    pub fn filtering<F>(&self, ctx: &TaskContext, predicate: F) -> ListView<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.derive_from_snapshots(ctx, "filter", move |items| {
            items.iter().filter(|x| predicate(x)).cloned().collect()
        })
    }

    /// Elements stably sorted by `key`.
    pub fn sorting_by<K, F>(&self, ctx: &TaskContext, key: F) -> ListView<T>
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.derive_from_snapshots(ctx, "sort", move |items| {
            let mut sorted = items.to_vec();
            sorted.sort_by_key(&key);
            sorted
        })
    }

    /// Elements stably sorted by `compare`.
    pub fn sorting_with<F>(&self, ctx: &TaskContext, compare: F) -> ListView<T>
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.derive_from_snapshots(ctx, "sort", move |items| {
            let mut sorted = items.to_vec();
            sorted.sort_by(&compare);
            sorted
        })
    }

    /// Elements matching the latest predicate from `predicates`.
    ///
    /// Recomputes when either the source or the predicate changes. If the
    /// predicate stream closes, its last value keeps applying.
    pub fn filtering_with(
        &self,
        ctx: &TaskContext,
        predicates: watch::Receiver<Predicate<T>>,
    ) -> ListView<T> {
        self.derive_with_param(ctx, "filter", predicates, |items, predicate| {
            items.iter().filter(|x| predicate(x)).cloned().collect()
        })
    }

    /// Elements sorted by the latest comparator from `comparators`.
    pub fn sorting_with_stream(
        &self,
        ctx: &TaskContext,
        comparators: watch::Receiver<Comparator<T>>,
    ) -> ListView<T> {
        self.derive_with_param(ctx, "sort", comparators, |items, compare| {
            let mut sorted = items.to_vec();
            sorted.sort_by(|a, b| compare(a, b));
            sorted
        })
    }

    fn derive_from_snapshots<R, F>(&self, ctx: &TaskContext, op: &'static str, transform: F) -> ListView<R>
    where
        R: Clone + Send + Sync + 'static,
        F: Fn(&[T]) -> Vec<R> + Send + 'static,
    {
        let mut source = self.items_channel();
        let initial = transform(&source.borrow());
        let mut derived = ObservableList::new(initial);
        let view = derived.view();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    changed = source.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = source.borrow_and_update().clone();
                        derived.set_all(transform(&snapshot));
                    }
                }
            }
            tracing::trace!(op, len = derived.len(), "Derived view detached");
        });
        view
    }

    fn derive_with_param<P, F>(
        &self,
        ctx: &TaskContext,
        op: &'static str,
        mut params: watch::Receiver<P>,
        transform: F,
    ) -> ListView<T>
    where
        P: Clone + Send + Sync + 'static,
        F: Fn(&[T], &P) -> Vec<T> + Send + 'static,
    {
        let mut source = self.items_channel();
        let mut param = params.borrow_and_update().clone();
        let initial = transform(&source.borrow(), &param);
        let mut derived = ObservableList::new(initial);
        let view = derived.view();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut params_open = true;
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break,
                    changed = source.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = params.changed(), if params_open => {
                        match changed {
                            Ok(()) => param = params.borrow_and_update().clone(),
                            Err(_) => {
                                tracing::trace!(op, "Parameter stream closed, keeping last value");
                                params_open = false;
                                continue;
                            }
                        }
                    }
                }
                let snapshot = source.borrow_and_update().clone();
                derived.set_all(transform(&snapshot, &param));
            }
            tracing::trace!(op, len = derived.len(), "Derived view detached");
        });
        view
    }
}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> ListView<T> {
    /// First occurrence of each element, in source order.
    pub fn distincting(&self, ctx: &TaskContext) -> ListView<T> {
        self.derive_from_snapshots(ctx, "distinct", |items| {
            let mut seen = HashSet::with_capacity(items.len());
            items.iter().filter(|x| seen.insert(*x)).cloned().collect()
        })
    }
}

fn apply_mapped<T, R, F>(derived: &mut ObservableList<R>, event: ChangeEvent<T>, f: &F)
where
    R: Clone,
    F: Fn(&T) -> R,
{
    let result = match event {
        ChangeEvent::Added { item } => {
            derived.add(f(&item));
            Ok(())
        }
        ChangeEvent::AddedBulk { items } => {
            derived.add_all(items.iter().map(f));
            Ok(())
        }
        ChangeEvent::Removed { index, .. } => derived.remove_at(index).map(|_| ()),
        ChangeEvent::RemovedBulk { indices, .. } => derived.remove_all_at(&indices).map(|_| ()),
        ChangeEvent::Set { index, item, .. } => derived.set(index, f(&item)).map(|_| ()),
        ChangeEvent::SetBulk { items, .. } => {
            derived.set_all(items.iter().map(f).collect());
            Ok(())
        }
    };
    if let Err(err) = result {
        tracing::error!(error = %err, "Mapped view out of sync with its source");
    }
}

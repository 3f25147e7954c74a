//! Read-only access to an observable list's streams.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use super::event::ChangeEvent;
use crate::channel::{lock, Conflated, Fanout};

/// Publication side shared by a list and all of its views.
///
/// A snapshot and the change event that produced it are published under one
/// commit lock, and `subscribe()` takes its snapshot under the same lock, so
/// a subscriber's first event always applies on top of its snapshot.
pub(crate) struct ListShared<T> {
    snapshot: Conflated<Arc<Vec<T>>>,
    changes: Fanout<ChangeEvent<T>>,
    commit: Mutex<()>,
}

impl<T: Clone> ListShared<T> {
    pub(crate) fn new(initial: Arc<Vec<T>>) -> Self {
        Self {
            snapshot: Conflated::new(initial),
            changes: Fanout::new(),
            commit: Mutex::new(()),
        }
    }

    pub(crate) fn publish(&self, snapshot: Arc<Vec<T>>, event: ChangeEvent<T>) {
        let _commit = lock(&self.commit);
        self.snapshot.set(snapshot);
        self.changes.publish(event);
    }

    pub(crate) fn last_published(&self) -> Arc<Vec<T>> {
        self.snapshot.get()
    }
}

impl<T> ListShared<T> {
    pub(crate) fn close(&self) {
        let _commit = lock(&self.commit);
        self.snapshot.close();
        self.changes.close();
    }
}

/// Cloneable, read-only handle to an [`ObservableList`](super::ObservableList)
/// or a derived view.
///
/// Any number of views may read and subscribe concurrently with the list's
/// single owner.
pub struct ListView<T> {
    pub(crate) shared: Arc<ListShared<T>>,
}

impl<T> Clone for ListView<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> ListView<T> {
    /// Contents after the last published change.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.shared.last_published()
    }

    /// Conflated stream of full snapshots, one per published change.
    pub fn items_channel(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.shared.snapshot.subscribe()
    }

    /// Every change event published from now on, in order.
    pub fn changes(&self) -> mpsc::UnboundedReceiver<ChangeEvent<T>> {
        self.shared.changes.subscribe()
    }

    /// The current snapshot together with a change stream starting right
    /// after it.
    pub fn subscribe(&self) -> (Arc<Vec<T>>, mpsc::UnboundedReceiver<ChangeEvent<T>>) {
        let _commit = lock(&self.shared.commit);
        (self.shared.last_published(), self.shared.changes.subscribe())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl<T> ListView<T> {
    /// Whether the owning list has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.changes.is_closed()
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ListView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListView")
            .field("items", &self.snapshot())
            .field("closed", &self.is_closed())
            .finish()
    }
}

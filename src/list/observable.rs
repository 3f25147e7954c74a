//! The mutable, event-publishing list.
//!
//! # Invariants
//! - Outside a buffer, every successful mutation publishes exactly one
//!   [`ChangeEvent`] describing its delta, plus the resulting snapshot.
//! - With buffering off and no mutation in flight, the last published
//!   snapshot equals the list contents.
//! - A failed precondition leaves the list untouched and publishes nothing.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::event::ChangeEvent;
use super::view::{ListShared, ListView};

/// Errors for mutations whose target is not in the list.
///
/// These are caller bugs: the caller referred to an element or position that
/// is not currently present.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("Item is not in the list")]
    ItemNotFound,

    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// A list that publishes a snapshot stream and a change stream.
///
/// Mutations take `&mut self`: the list has exactly one mutator at a time.
/// Readers go through [`ListView`]s and only ever observe published
/// snapshots, never a half-applied mutation. Dropping the list closes its
/// streams.
pub struct ObservableList<T> {
    items: Vec<T>,
    shared: Arc<ListShared<T>>,
    buffer_depth: usize,
}

impl<T: Clone> ObservableList<T> {
    pub fn new(initial: Vec<T>) -> Self {
        let shared = Arc::new(ListShared::new(Arc::new(initial.clone())));
        Self {
            items: initial,
            shared,
            buffer_depth: 0,
        }
    }

    pub fn view(&self) -> ListView<T> {
        ListView {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn is_buffering(&self) -> bool {
        self.buffer_depth > 0
    }

    fn emit(&self, event: impl FnOnce() -> ChangeEvent<T>) {
        if self.is_buffering() {
            return;
        }
        let event = event();
        tracing::trace!(kind = event.kind(), len = self.items.len(), "List changed");
        self.shared.publish(Arc::new(self.items.clone()), event);
    }

    fn check_index(&self, index: usize) -> Result<(), ListError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(ListError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            })
        }
    }

    pub fn add(&mut self, item: T) {
        self.items.push(item.clone());
        self.emit(|| ChangeEvent::Added { item });
    }

    pub fn add_all(&mut self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        self.items.extend(items.iter().cloned());
        self.emit(|| ChangeEvent::AddedBulk { items });
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, ListError> {
        self.check_index(index)?;
        let item = self.items.remove(index);
        let removed = item.clone();
        self.emit(|| ChangeEvent::Removed {
            index,
            item: removed,
        });
        Ok(item)
    }

    /// Remove every element whose position is in `indices`, in one pass.
    ///
    /// All indices refer to positions before the removal. The event keeps
    /// `indices` in the caller's order and lists the removed elements in list
    /// order. Returns the removed elements in list order.
    pub fn remove_all_at(&mut self, indices: &[usize]) -> Result<Vec<T>, ListError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.items.len()) {
            return Err(ListError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .enumerate()
            .partition(|(i, _)| doomed.contains(i));
        self.items = kept.into_iter().map(|(_, item)| item).collect();
        let removed: Vec<T> = removed.into_iter().map(|(_, item)| item).collect();

        let event_items = removed.clone();
        self.emit(|| ChangeEvent::RemovedBulk {
            indices: indices.to_vec(),
            items: event_items,
        });
        Ok(removed)
    }

    /// Overwrite the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, item: T) -> Result<T, ListError> {
        self.check_index(index)?;
        let prev = std::mem::replace(&mut self.items[index], item.clone());
        let event_prev = prev.clone();
        self.emit(|| ChangeEvent::Set {
            index,
            item,
            prev: event_prev,
        });
        Ok(prev)
    }

    /// Replace the whole contents.
    pub fn set_all(&mut self, items: Vec<T>) {
        let prev = std::mem::replace(&mut self.items, items);
        self.emit(|| ChangeEvent::SetBulk {
            items: self.items.clone(),
            prev,
        });
    }

    /// Start a buffered batch; see [`Buffer`].
    pub fn buffer(&mut self) -> Buffer<'_, T> {
        self.buffer_depth += 1;
        tracing::trace!(depth = self.buffer_depth, "List buffering started");
        Buffer { list: self }
    }

    /// Run `f` as one buffered batch and return its result.
    pub fn buffered<R>(&mut self, f: impl FnOnce(&mut ObservableList<T>) -> R) -> R {
        let mut buffer = self.buffer();
        let result = f(&mut buffer);
        drop(buffer);
        result
    }

    /// Publish the current contents as one `SetBulk` against the last
    /// published snapshot.
    fn flush(&self) {
        let prev = self.shared.last_published();
        tracing::trace!(
            from = prev.len(),
            to = self.items.len(),
            "List buffering flushed"
        );
        self.shared.publish(
            Arc::new(self.items.clone()),
            ChangeEvent::SetBulk {
                items: self.items.clone(),
                prev: prev.as_ref().clone(),
            },
        );
    }
}

impl<T: Clone + PartialEq> ObservableList<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    /// Remove the first occurrence of `item`.
    pub fn remove_item(&mut self, item: &T) -> Result<(), ListError> {
        let index = self.position(item).ok_or(ListError::ItemNotFound)?;
        self.remove_at(index).map(|_| ())
    }

    /// Remove one occurrence per element of `items`.
    ///
    /// Repeated elements consume distinct occurrences, so removing `[a, a]`
    /// requires `a` to be present twice.
    pub fn remove_all(&mut self, items: &[T]) -> Result<Vec<T>, ListError> {
        let mut indices = Vec::with_capacity(items.len());
        for target in items {
            let index = self
                .items
                .iter()
                .enumerate()
                .position(|(i, x)| x == target && !indices.contains(&i))
                .ok_or(ListError::ItemNotFound)?;
            indices.push(index);
        }
        self.remove_all_at(&indices)
    }

    /// Swap the first occurrence of `source` for `target`.
    pub fn replace(&mut self, source: &T, target: T) -> Result<(), ListError> {
        let index = self.position(source).ok_or(ListError::ItemNotFound)?;
        self.set(index, target).map(|_| ())
    }
}

impl<T> Drop for ObservableList<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &self.items)
            .field("buffer_depth", &self.buffer_depth)
            .finish()
    }
}

/// RAII guard for a buffered batch of mutations.
///
/// While any guard is alive, mutations change the list silently. When the
/// outermost guard drops, including during unwinding, the list publishes a
/// single `SetBulk` from the last published snapshot to the final contents.
/// Nested guards flush once.
pub struct Buffer<'a, T: Clone> {
    list: &'a mut ObservableList<T>,
}

impl<T: Clone> Deref for Buffer<'_, T> {
    type Target = ObservableList<T>;

    fn deref(&self) -> &Self::Target {
        self.list
    }
}

impl<T: Clone> DerefMut for Buffer<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.list
    }
}

impl<T: Clone> Drop for Buffer<'_, T> {
    fn drop(&mut self) {
        self.list.buffer_depth -= 1;
        if self.list.buffer_depth == 0 {
            self.list.flush();
        }
    }
}

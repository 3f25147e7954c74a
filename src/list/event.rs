//! Structured change events published by an observable list.

/// One committed mutation of an [`ObservableList`](super::ObservableList).
///
/// # Exhaustive Matching
/// Consumers match every variant explicitly, without a catch-all arm.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    /// `item` was appended.
    Added { item: T },

    /// `items` were appended, in order.
    AddedBulk { items: Vec<T> },

    /// The element at `index` (before removal) was removed.
    Removed { index: usize, item: T },

    /// The elements at `indices` were removed in one pass.
    ///
    /// `indices` keeps the caller's order; `items` lists the removed
    /// elements in their order in the list before removal.
    RemovedBulk { indices: Vec<usize>, items: Vec<T> },

    /// The element at `index` changed from `prev` to `item`.
    Set { index: usize, item: T, prev: T },

    /// The whole contents changed from `prev` to `items`.
    SetBulk { items: Vec<T>, prev: Vec<T> },
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added { .. } => "added",
            ChangeEvent::AddedBulk { .. } => "added_bulk",
            ChangeEvent::Removed { .. } => "removed",
            ChangeEvent::RemovedBulk { .. } => "removed_bulk",
            ChangeEvent::Set { .. } => "set",
            ChangeEvent::SetBulk { .. } => "set_bulk",
        }
    }
}

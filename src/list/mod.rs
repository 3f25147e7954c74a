//! Observable list engine.
//!
//! An [`ObservableList`] is owned by one mutator and publishes two streams to
//! any number of [`ListView`]s:
//! - a conflated stream of immutable snapshots
//! - a lossless, ordered stream of [`ChangeEvent`]s, one per mutation
//!
//! A [`Buffer`] collapses a batch of mutations into a single `SetBulk`.
//! Views derive further live lists through `mapping`, `filtering`,
//! `sorting_by`, `sorting_with`, `distincting` and their stream-driven
//! variants.

mod derive;
mod event;
mod observable;
mod view;

pub use derive::{Comparator, Predicate};
pub use event::ChangeEvent;
pub use observable::{Buffer, ListError, ObservableList};
pub use view::ListView;

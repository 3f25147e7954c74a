//! Broadcast primitives shared by the task and list engines.
//!
//! - [`Conflated`]: a single-slot, latest-value-wins cell. Subscribers always
//!   wake with the newest value; a subscriber slower than the producer can
//!   miss intermediate values. Used for progress and message lines.
//! - [`Fanout`]: ordered, lossless delivery of every value to every
//!   subscriber, optionally replaying the history to late subscribers. Used
//!   wherever a dropped element would be a bug (sub-tasks, list changes).
//!
//! Both close explicitly. Closing drops the underlying senders, so receivers
//! observe end-of-stream after reading whatever is still buffered.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

/// Lock a mutex, recovering the inner state if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("Mutex poisoned, recovering inner state");
            poisoned.into_inner()
        }
    }
}

/// Latest-value-wins broadcast cell.
///
/// # Invariants
/// - `get()` always returns the last value passed to `set()` (or the initial
///   value), including after `close()`.
/// - After `close()`, `set()` is a no-op and every receiver's `changed()`
///   fails once the final value has been seen.
pub struct Conflated<T> {
    tx: Mutex<Option<watch::Sender<T>>>,
    rx: watch::Receiver<T>,
}

impl<T: Clone> Conflated<T> {
    pub fn new(initial: T) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Overwrite the current value and wake all subscribers.
    ///
    /// Returns `false` if the cell is already closed.
    pub fn set(&self, value: T) -> bool {
        match lock(&self.tx).as_ref() {
            Some(tx) => {
                tx.send_replace(value);
                true
            }
            None => {
                tracing::trace!("Ignoring write to closed conflated channel");
                false
            }
        }
    }

    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Subscribe to future values. The current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        let mut rx = self.rx.clone();
        rx.borrow_and_update();
        rx
    }
}

impl<T> Conflated<T> {
    pub fn close(&self) {
        lock(&self.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }
}

struct FanoutState<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    history: Option<Vec<T>>,
    closed: bool,
}

/// Ordered, lossless broadcast.
///
/// Each subscriber owns an unbounded queue, so a slow subscriber never causes
/// another subscriber (or the publisher) to lose or wait for values.
pub struct Fanout<T> {
    state: Mutex<FanoutState<T>>,
}

impl<T: Clone> Fanout<T> {
    /// Fan-out that only delivers values published after subscription.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Fan-out that replays every value ever published to late subscribers.
    pub fn with_replay() -> Self {
        Self::build(Some(Vec::new()))
    }

    fn build(history: Option<Vec<T>>) -> Self {
        Self {
            state: Mutex::new(FanoutState {
                subscribers: Vec::new(),
                history,
                closed: false,
            }),
        }
    }

    /// Deliver `value` to every live subscriber.
    ///
    /// Returns `false` if the fan-out is closed.
    pub fn publish(&self, value: T) -> bool {
        let mut state = lock(&self.state);
        if state.closed {
            tracing::trace!("Ignoring publish to closed fan-out");
            return false;
        }
        state.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        if let Some(history) = state.history.as_mut() {
            history.push(value);
        }
        true
    }

    /// Subscribe, receiving the replayed history first when replay is on.
    ///
    /// Subscribing to a closed fan-out yields a receiver that drains the
    /// history (if any) and then ends.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        if let Some(history) = state.history.as_ref() {
            for value in history {
                let _ = tx.send(value.clone());
            }
        }
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Values published so far. Empty unless created with replay.
    pub fn history(&self) -> Vec<T> {
        lock(&self.state).history.clone().unwrap_or_default()
    }
}

impl<T> Fanout<T> {
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

impl<T: Clone> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

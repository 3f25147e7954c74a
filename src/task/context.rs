//! Execution context passed explicitly through a task tree.

use tokio_util::sync::CancellationToken;

/// Cancellation-and-scheduling handle a task runs under.
///
/// The engine does not own scheduling: tasks run on whatever tokio runtime
/// polls `Task::run`. The context carries the cooperative cancellation signal
/// and the nesting depth, and is handed down to every sub-task explicitly.
///
/// # Postcondition of `child_context`
/// `child.depth() == self.depth() + 1` and both share one cancellation token,
/// so cancelling any context in a tree cancels the whole tree.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    cancel_token: CancellationToken,
    depth: usize,
}

impl TaskContext {
    /// Create a root context with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root context driven by an existing token (e.g. one owned by
    /// the view that offers the cancel button).
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            depth: 0,
        }
    }

    /// Create the context a sub-task runs under.
    pub fn child_context(&self) -> Self {
        Self {
            cancel_token: self.cancel_token.clone(),
            depth: self.depth + 1,
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if cooperative cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

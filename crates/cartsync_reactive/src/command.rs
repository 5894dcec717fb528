//! Single-flight async commands.
//!
//! A [`Command`] wraps an asynchronous operation returning an
//! [`ActionResult`] and exposes its lifecycle through an
//! [`Observable<ActionState<T>>`](Observable).
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──execute──▶ Running ──Ok──▶ Succeeded ──execute──▶ Running ...
//!                          └──Err─▶ Failed    ──execute──▶ Running ...
//! ```
//!
//! `Succeeded` and `Failed` persist until the next accepted `execute` (or
//! [`Command::clear_result`]). At most one execution is in flight per command:
//! calling `execute` while `Running` returns [`Execution::AlreadyRunning`]
//! without invoking the operation or touching the state.
//!
//! Panics raised by the operation, either while building its future or while
//! polling it, are caught and surface as [`ActionError::Panicked`].
//!
//! # Example
//!
//! ```
//! use cartsync_reactive::{ActionError, ActionStatus, Command};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let remove = Command::new(|item: String| async move {
//!     if item.is_empty() {
//!         Err(ActionError::operation("empty item key"))
//!     } else {
//!         Ok(item.len())
//!     }
//! })
//! .named("remove_item");
//!
//! remove.execute(String::new()).await;
//! assert_eq!(remove.status(), ActionStatus::Failed);
//!
//! remove.execute("sku-1".into()).await;
//! assert_eq!(remove.last_value(), Some(5));
//! # });
//! ```

use core::fmt;
use core::future::Future;
use core::panic::AssertUnwindSafe;
use core::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::observable::Observable;
use crate::outcome::{ActionError, ActionResult};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Operation<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, ActionResult<T>> + Send + Sync>;

/// Zero-argument command.
pub type Command0<T> = Command<(), T>;

/// One-argument command.
pub type Command1<A, T> = Command<A, T>;

// ─────────────────────────────────────────────────────────────────────────────
// ActionStatus / ActionState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a [`Command`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    /// Never executed, or reset via [`Command::clear_result`].
    #[default]
    Idle,
    /// An execution is in flight.
    Running,
    /// The last execution returned a value.
    Succeeded,
    /// The last execution failed or panicked.
    Failed,
}

/// Observable state owned by one [`Command`].
#[derive(Debug, Clone)]
pub struct ActionState<T> {
    /// Current lifecycle status.
    pub status: ActionStatus,
    /// Error of the last execution, set only when `status` is `Failed`.
    pub last_error: Option<ActionError>,
    /// Value of the last execution, set only when `status` is `Succeeded`.
    pub last_value: Option<T>,
}

impl<T> Default for ActionState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> ActionState<T> {
    fn with_status(status: ActionStatus) -> Self {
        Self {
            status,
            last_error: None,
            last_value: None,
        }
    }

    /// A fresh state with no outcome.
    #[must_use]
    pub fn idle() -> Self {
        Self::with_status(ActionStatus::Idle)
    }

    fn running() -> Self {
        Self::with_status(ActionStatus::Running)
    }

    fn succeeded(value: T) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            last_error: None,
            last_value: Some(value),
        }
    }

    fn failed(error: ActionError) -> Self {
        Self {
            status: ActionStatus::Failed,
            last_error: Some(error),
            last_value: None,
        }
    }

    /// Returns `true` while an execution is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ActionStatus::Running
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to one call of [`Command::execute`].
#[derive(Debug)]
pub enum Execution<T> {
    /// The call was accepted and ran to completion.
    Completed(ActionResult<T>),
    /// Another execution was in flight; the call was dropped.
    AlreadyRunning,
}

impl<T> Execution<T> {
    /// Returns the outcome if the call was accepted.
    pub fn into_result(self) -> Option<ActionResult<T>> {
        match self {
            Self::Completed(result) => Some(result),
            Self::AlreadyRunning => None,
        }
    }

    /// Returns `true` if the call was dropped by the single-flight guard.
    #[must_use]
    pub fn was_skipped(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// An async, fallible operation with observable lifecycle and mutual exclusion.
///
/// Clones share the same operation and state, so a clone handed to a UI layer
/// observes the same `Running` flag as the original.
pub struct Command<A, T> {
    name: Arc<str>,
    op: Operation<A, T>,
    state: Observable<ActionState<T>>,
}

impl<A, T> Clone for Command<A, T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            op: Arc::clone(&self.op),
            state: self.state.clone(),
        }
    }
}

impl<A, T> Command<A, T>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wraps a one-argument async operation.
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<T>> + Send + 'static,
    {
        let op: Operation<A, T> = Arc::new(move |args| Box::pin(op(args)));
        Self {
            name: Arc::from("command"),
            op,
            state: Observable::new(ActionState::idle()),
        }
    }

    /// Sets the name used in log output.
    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs the operation unless an execution is already in flight.
    ///
    /// On acceptance the state moves to `Running` (clearing the previous value
    /// and error) and is then settled to `Succeeded` or `Failed`. Each
    /// transition is published to subscribers of [`observe`](Self::observe).
    ///
    /// The returned [`Execution`] mirrors what was published; observing the
    /// state is equivalent.
    pub async fn execute(&self, args: A) -> Execution<T> {
        let accepted = self
            .state
            .update_if(|state| (!state.is_running()).then(ActionState::running));
        if !accepted {
            tracing::debug!(command = %self.name, "execution skipped: already running");
            return Execution::AlreadyRunning;
        }

        tracing::debug!(command = %self.name, "execution started");
        let mut guard = InFlight {
            state: &self.state,
            settled: false,
        };

        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.op)(args))) {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(ActionError::from_panic(&*payload))),
            Err(payload) => Err(ActionError::from_panic(&*payload)),
        };

        match &result {
            Ok(value) => {
                tracing::debug!(command = %self.name, "execution succeeded");
                guard.settle(ActionState::succeeded(value.clone()));
            }
            Err(err) => {
                tracing::warn!(command = %self.name, error = %err, "execution failed");
                guard.settle(ActionState::failed(err.clone()));
            }
        }

        Execution::Completed(result)
    }

    /// Resets a settled command back to `Idle`, dropping its value and error.
    ///
    /// Returns `false` (and does nothing) while an execution is in flight.
    pub fn clear_result(&self) -> bool {
        self.state
            .update_if(|state| (!state.is_running()).then(ActionState::idle))
    }

    /// Returns the observable carrying this command's state.
    #[must_use]
    pub fn observe(&self) -> &Observable<ActionState<T>> {
        &self.state
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ActionState<T> {
        self.state.get()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.state().status
    }

    /// Returns `true` while an execution is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == ActionStatus::Running
    }

    /// Returns `true` if the last execution succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status() == ActionStatus::Succeeded
    }

    /// Returns `true` if the last execution failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status() == ActionStatus::Failed
    }

    /// Value produced by the last successful execution.
    #[must_use]
    pub fn last_value(&self) -> Option<T> {
        self.state().last_value
    }

    /// Error produced by the last failed execution.
    #[must_use]
    pub fn last_error(&self) -> Option<ActionError> {
        self.state().last_error
    }

    /// Name used in log output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Command<(), T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps a zero-argument async operation.
    pub fn new0<F, Fut>(op: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<T>> + Send + 'static,
    {
        Self::new(move |()| op())
    }

    /// Shorthand for `execute(())`.
    pub async fn run(&self) -> Execution<T> {
        self.execute(()).await
    }
}

impl<A, T> fmt::Debug for Command<A, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("status", &self.state.get().status)
            .finish_non_exhaustive()
    }
}

/// Settles the state to `Failed` if an accepted execution is dropped mid-flight.
struct InFlight<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    state: &'a Observable<ActionState<T>>,
    settled: bool,
}

impl<T> InFlight<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn settle(&mut self, next: ActionState<T>) {
        self.settled = true;
        self.state.publish(next);
    }
}

impl<T> Drop for InFlight<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            self.state.publish(ActionState::failed(ActionError::operation(
                "execution was dropped before completion",
            )));
        }
    }
}

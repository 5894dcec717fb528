//! Success/failure outcome contract.
//!
//! Every fallible operation in cartsync returns an [`ActionResult<T>`], which
//! is a plain [`Result`] with [`ActionError`] as the failure side. The compiler
//! forces call sites to handle both variants; [`OutcomeExt`] adds a `fold` that
//! collapses both branches into a single value and a `value_or` accessor.

use core::fmt;
use std::sync::Arc;

/// Shareable, opaque cause attached to an [`ActionError`].
pub type ErrorSource = Arc<dyn core::error::Error + Send + Sync + 'static>;

/// The outcome of a fallible cartsync operation.
pub type ActionResult<T> = Result<T, ActionError>;

/// Failure raised by an operation wrapped in a [`Command`](crate::Command).
///
/// `ActionError` is `Clone` so it can live inside observable state and be
/// delivered to any number of subscribers. Underlying causes are kept opaque
/// behind an [`Arc`].
#[derive(Clone, thiserror::Error)]
pub enum ActionError {
    /// The operation reported a failure through its result.
    #[error("operation failed: {message}")]
    Operation {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<ErrorSource>,
    },

    /// The operation panicked instead of returning a result.
    #[error("operation panicked: {message}")]
    Panicked {
        /// The rendered panic payload.
        message: String,
    },
}

impl ActionError {
    /// Creates an [`Operation`](Self::Operation) error without a cause.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error as the cause of an [`Operation`](Self::Operation) error.
    pub fn from_source<E>(err: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self::Operation {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Creates a [`Panicked`](Self::Panicked) error from a caught panic payload.
    pub fn from_panic(payload: &(dyn core::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panicked { message }
    }

    /// Returns the opaque cause, if one was attached.
    ///
    /// Use this to downcast back to a concrete error type:
    ///
    /// ```
    /// use cartsync_reactive::ActionError;
    ///
    /// let err = ActionError::from_source(std::fmt::Error);
    /// assert!(err.source_ref().is_some_and(|s| s.is::<std::fmt::Error>()));
    /// ```
    #[must_use]
    pub fn source_ref(&self) -> Option<&(dyn core::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Operation { source, .. } => source.as_deref(),
            Self::Panicked { .. } => None,
        }
    }

    /// Returns `true` if the operation panicked.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

impl fmt::Debug for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { message, source } => f
                .debug_struct("Operation")
                .field("message", message)
                .field("source", &source.as_ref().map(ToString::to_string))
                .finish(),
            Self::Panicked { message } => {
                f.debug_struct("Panicked").field("message", message).finish()
            }
        }
    }
}

/// Combinators shared by every [`ActionResult`].
pub trait OutcomeExt<T> {
    /// Collapses both variants into a single value.
    ///
    /// ```
    /// use cartsync_reactive::{ActionError, ActionResult, OutcomeExt};
    ///
    /// let ok: ActionResult<u32> = Ok(2);
    /// let err: ActionResult<u32> = Err(ActionError::operation("offline"));
    ///
    /// assert_eq!(ok.fold(|v| v.to_string(), |e| e.to_string()), "2");
    /// assert_eq!(err.fold(|v| v.to_string(), |_| "failed".into()), "failed");
    /// ```
    fn fold<R>(self, on_success: impl FnOnce(T) -> R, on_failure: impl FnOnce(ActionError) -> R)
    -> R;

    /// Returns the success value, or `default` on failure.
    fn value_or(self, default: T) -> T;

    /// Returns `true` for the success variant.
    fn is_success(&self) -> bool;

    /// Returns `true` for the failure variant.
    fn is_failure(&self) -> bool;
}

impl<T> OutcomeExt<T> for ActionResult<T> {
    fn fold<R>(
        self,
        on_success: impl FnOnce(T) -> R,
        on_failure: impl FnOnce(ActionError) -> R,
    ) -> R {
        match self {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }
    }

    fn value_or(self, default: T) -> T {
        self.unwrap_or(default)
    }

    fn is_success(&self) -> bool {
        self.is_ok()
    }

    fn is_failure(&self) -> bool {
        self.is_err()
    }
}

//! Storage collaborators consumed by the coordinator.
//!
//! Implementations own their internal consistency for single calls. The
//! coordinator never issues overlapping calls to the same store.

use core::fmt;

use async_trait::async_trait;
use cartsync_reconcile::QuantityCollection;
use serde::{Deserialize, Serialize};

/// Opaque token identifying a signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Creates a token from any string-like value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// The identity of the current session: `None` is anonymous, `Some` is signed in.
pub type IdentityContext = Option<IdentityToken>;

/// Which store an operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The unscoped store holding the anonymous session's items.
    Anonymous,
    /// The identity-scoped store holding signed-in items.
    Identified,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Anonymous => f.write_str("anonymous"),
            Backend::Identified => f.write_str("identified"),
        }
    }
}

/// Errors reported by storage collaborators.
///
/// The coordinator treats these as opaque: they are logged with the failing
/// phase and backend, never inspected or retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Reading a snapshot failed.
    #[error("{backend} store fetch failed: {message}")]
    Fetch {
        /// The store that failed.
        backend: Backend,
        /// Description of the failure.
        message: String,
    },

    /// Persisting a snapshot failed.
    #[error("{backend} store write failed: {message}")]
    Write {
        /// The store that failed.
        backend: Backend,
        /// Description of the failure.
        message: String,
    },

    /// Clearing a store failed.
    #[error("{backend} store clear failed: {message}")]
    Clear {
        /// The store that failed.
        backend: Backend,
        /// Description of the failure.
        message: String,
    },

    /// The store could not be reached at all.
    #[error("{backend} store is unavailable")]
    Unavailable {
        /// The store that failed.
        backend: Backend,
    },
}

impl StorageError {
    /// Returns the store that reported the error.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::Fetch { backend, .. }
            | Self::Write { backend, .. }
            | Self::Clear { backend, .. }
            | Self::Unavailable { backend } => *backend,
        }
    }
}

/// Unscoped store for the anonymous session's items.
#[async_trait]
pub trait AnonymousStore: Send + Sync + 'static {
    /// Reads the current snapshot.
    async fn fetch(&self) -> Result<QuantityCollection, StorageError>;

    /// Removes every item.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Returns a counter that changes whenever the store is cleared or its
    /// contents are replaced wholesale. Adding or removing single items need
    /// not change it.
    ///
    /// Stores that cannot track this return `None` (the default); the
    /// coordinator then never assumes that items it migrated earlier are still
    /// the ones held here.
    async fn generation(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }
}

/// Identity-scoped store for signed-in items.
#[async_trait]
pub trait IdentifiedStore: Send + Sync + 'static {
    /// Reads the snapshot belonging to `identity`.
    async fn fetch(&self, identity: &IdentityToken) -> Result<QuantityCollection, StorageError>;

    /// Replaces the snapshot belonging to `identity`.
    async fn write(
        &self,
        identity: &IdentityToken,
        items: QuantityCollection,
    ) -> Result<(), StorageError>;
}

//! Anonymous-to-identified cart reconciliation (Layer 2).
//!
//! When a session signs in, items collected anonymously must end up in the
//! signed-in account without being lost or counted twice. This crate provides:
//!
//! - [`AnonymousStore`] / [`IdentifiedStore`] - Storage collaborator traits
//! - [`InMemoryAnonymousStore`] / [`InMemoryIdentifiedStore`] - Reference stores
//! - [`ContextSwitchCoordinator`] - Watches the identity context and runs the
//!   fetch / merge / write / clear migration on the anonymous-to-identified edge
//! - [`CoordinatorConfig`] - Tunables for the coordinator
//!
//! # Failure Containment
//!
//! - A failed fetch aborts before anything is written
//! - A failed write aborts before the anonymous store is cleared
//! - A failed clear is logged; the written merge stands. The migrated snapshot
//!   is remembered and left out of the next merge to the same identity, but
//!   only while the anonymous store provably still holds it
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cartsync_migration::{
//!     ContextSwitchCoordinator, CoordinatorConfig, IdentityToken, InMemoryAnonymousStore,
//!     InMemoryIdentifiedStore, Transition,
//! };
//! use cartsync_reconcile::QuantityCollection;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let anonymous = Arc::new(InMemoryAnonymousStore::with_items(
//!     QuantityCollection::from_entries([("p1", 2)]),
//! ));
//! let identified = Arc::new(InMemoryIdentifiedStore::new());
//! let coordinator = ContextSwitchCoordinator::new(
//!     anonymous.clone(),
//!     identified.clone(),
//!     CoordinatorConfig::default(),
//! );
//!
//! let user = IdentityToken::new("user-42");
//! coordinator.handle_context(None).await;
//! let transition = coordinator.handle_context(Some(user.clone())).await;
//!
//! assert!(matches!(transition, Transition::Migrated(_)));
//! assert_eq!(identified.snapshot(&user).get("p1"), Some(2));
//! assert!(anonymous.snapshot().is_empty());
//! # });
//! ```

mod config;
mod coordinator;
mod memory;
mod storage;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{
    AnonymousSnapshot, AttachError, AwaitingClear, ContextSwitchCoordinator, CoordinatorHandle,
    MigrationPhase, MigrationPhases, MigrationReport, MigrationStatus, Transition,
};
pub use memory::{InMemoryAnonymousStore, InMemoryIdentifiedStore};
pub use storage::{
    AnonymousStore, Backend, IdentifiedStore, IdentityContext, IdentityToken, StorageError,
};

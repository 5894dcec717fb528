//! # cartsync Internal Library
//!
//! Re-exports the core cartsync crates for convenience.

/// Layer 1: Outcomes, observables and single-flight commands.
pub use cartsync_reactive;

/// Layer 1: Keyed-quantity snapshots and additive merge.
pub use cartsync_reconcile;

/// Layer 2: Anonymous-to-identified migration.
pub use cartsync_migration;

/// Tracing subscriber setup.
pub use cartsync_telemetry;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use cartsync_migration::{
        AnonymousStore, ContextSwitchCoordinator, CoordinatorConfig, IdentifiedStore,
        IdentityContext, IdentityToken, MigrationStatus, StorageError, Transition,
    };
    pub use cartsync_reactive::prelude::*;
    pub use cartsync_reconcile::prelude::*;
}

//! Reactive action controllers and anonymous-to-identified cart reconciliation.
//!
//! See [`cartsync_migration`] for the sign-in flow and [`cartsync_reactive`]
//! for the command and observable primitives it is built on.

pub use cartsync_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use cartsync_internal::prelude::*;
}

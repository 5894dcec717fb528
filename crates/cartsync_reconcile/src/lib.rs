//! Keyed-quantity snapshots and their reconciliation (Layer 1).
//!
//! - [`QuantityCollection`] - Immutable mapping from [`ItemKey`] to a strictly
//!   positive quantity. Every "mutation" returns a new snapshot.
//! - [`merge`] - Additive, deterministic reconciliation of two snapshots,
//!   reporting the keys both sides held in a [`MergeOutcome`].
//!
//! Pure logic. No IO, no async.
//!
//! # Example
//!
//! ```
//! use cartsync_reconcile::{QuantityCollection, merge};
//!
//! let anonymous = QuantityCollection::from_entries([("p1", 2)]);
//! let identified = QuantityCollection::from_entries([("p1", 3), ("p2", 1)]);
//!
//! let outcome = merge(&anonymous, &identified);
//! assert_eq!(outcome.merged.get("p1"), Some(5));
//! assert_eq!(outcome.merged.get("p2"), Some(1));
//! assert!(outcome.conflicting_keys.iter().eq(["p1"]));
//! ```

/// Immutable keyed-quantity snapshots.
pub mod collection;

/// Additive reconciliation of keyed-quantity snapshots.
pub mod merge;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::collection::{InvariantViolation, ItemKey, Quantity, QuantityCollection};
    pub use crate::merge::{MergeOutcome, merge, merge_all};
}

pub use collection::{InvariantViolation, ItemKey, Quantity, QuantityCollection};
pub use merge::{MergeOutcome, merge, merge_all};

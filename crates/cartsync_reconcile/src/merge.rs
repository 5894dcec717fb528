//! Additive reconciliation of keyed-quantity snapshots.

use std::collections::{BTreeMap, BTreeSet};

use crate::collection::{ItemKey, Quantity, QuantityCollection};

/// Result of one reconciliation.
///
/// `conflicting_keys` is diagnostic only: it lists the keys held by more than
/// one input, whose quantities were summed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The reconciled snapshot.
    pub merged: QuantityCollection,
    /// Keys present in more than one input.
    pub conflicting_keys: BTreeSet<ItemKey>,
}

impl MergeOutcome {
    /// Returns `true` if any key was present on both sides.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicting_keys.is_empty()
    }
}

/// Additively reconciles two snapshots.
///
/// Starting from `b`, every `(key, qty)` of `a` is added to the running
/// result: keys present in both end up with the sum of both quantities, keys
/// present in one side keep that side's quantity.
///
/// The operation is commutative and associative, with the empty collection as
/// identity. Neither input is modified.
pub fn merge(a: &QuantityCollection, b: &QuantityCollection) -> MergeOutcome {
    // Snapshots are immutable, so an empty side lets us share the other one.
    if a.is_empty() || b.is_empty() {
        let merged = if a.is_empty() { b.clone() } else { a.clone() };
        return MergeOutcome {
            merged,
            conflicting_keys: BTreeSet::new(),
        };
    }

    let mut running: BTreeMap<ItemKey, Quantity> = b.as_map().clone();
    let mut conflicting_keys = BTreeSet::new();

    for (key, qty_a) in a.iter() {
        match running.get_mut(key) {
            Some(existing) => {
                *existing = existing.saturating_add(qty_a);
                conflicting_keys.insert(key.clone());
            }
            None => {
                running.insert(key.clone(), qty_a);
            }
        }
    }

    tracing::debug!(
        anonymous = a.len(),
        identified = b.len(),
        merged = running.len(),
        conflicts = conflicting_keys.len(),
        "reconciled quantity collections"
    );

    MergeOutcome {
        merged: QuantityCollection::from_map(running),
        conflicting_keys,
    }
}

/// Reconciles any number of snapshots, folding from the empty collection.
///
/// A key counts as conflicting once it has been seen in two or more inputs.
pub fn merge_all<'a, I>(collections: I) -> MergeOutcome
where
    I: IntoIterator<Item = &'a QuantityCollection>,
{
    collections
        .into_iter()
        .fold(MergeOutcome::default(), |acc, next| {
            let step = merge(next, &acc.merged);
            let mut conflicting_keys = acc.conflicting_keys;
            conflicting_keys.extend(step.conflicting_keys);
            MergeOutcome {
                merged: step.merged,
                conflicting_keys,
            }
        })
}

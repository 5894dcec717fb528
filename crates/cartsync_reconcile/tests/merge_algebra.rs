//! Property tests for the reconciliation algebra.
//!
//! Collections are generated over a small key alphabet so that overlaps are
//! frequent, and with raw quantities in `-2..=50` so that the non-positive
//! filtering path is exercised by construction.

use cartsync_reconcile::{QuantityCollection, merge, merge_all};
use proptest::prelude::*;

fn arb_collection() -> impl Strategy<Value = QuantityCollection> {
    prop::collection::vec(
        (prop::sample::select(vec!["p1", "p2", "p3", "p4", "p5", "p6"]), -2_i64..=50),
        0..8,
    )
    .prop_map(QuantityCollection::from_entries)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every merged key holds A[k], B[k] or A[k] + B[k] depending on presence.
    #[test]
    fn prop_pointwise_law(a in arb_collection(), b in arb_collection()) {
        let merged = merge(&a, &b).merged;

        for key in a.keys().chain(b.keys()) {
            let expected = match (a.get(key.as_str()), b.get(key.as_str())) {
                (Some(x), Some(y)) => x + y,
                (Some(x), None) => x,
                (None, Some(y)) => y,
                (None, None) => unreachable!("key came from one of the inputs"),
            };
            prop_assert_eq!(merged.get(key.as_str()), Some(expected));
        }
        prop_assert_eq!(merged.len(), a.keys().chain(b.keys()).collect::<std::collections::BTreeSet<_>>().len());
    }

    #[test]
    fn prop_commutative(a in arb_collection(), b in arb_collection()) {
        let ab = merge(&a, &b);
        let ba = merge(&b, &a);
        prop_assert_eq!(&ab.merged, &ba.merged);
        prop_assert_eq!(ab.conflicting_keys, ba.conflicting_keys);
    }

    #[test]
    fn prop_associative(a in arb_collection(), b in arb_collection(), c in arb_collection()) {
        let left = merge(&merge(&a, &b).merged, &c).merged;
        let right = merge(&a, &merge(&b, &c).merged).merged;
        prop_assert_eq!(left, right);
    }

    #[test]
    fn prop_empty_is_identity(a in arb_collection()) {
        let empty = QuantityCollection::new();
        prop_assert_eq!(&merge(&a, &empty).merged, &a);
        prop_assert_eq!(&merge(&empty, &a).merged, &a);
        prop_assert!(!merge(&a, &empty).has_conflicts());
    }

    /// Conflicting keys are exactly the keys present on both sides.
    #[test]
    fn prop_conflicts_are_key_intersection(a in arb_collection(), b in arb_collection()) {
        let outcome = merge(&a, &b);
        let shared: Vec<_> = a.keys().filter(|k| b.contains_key(k.as_str())).cloned().collect();
        prop_assert!(outcome.conflicting_keys.iter().eq(shared.iter()));
    }

    #[test]
    fn prop_never_produces_non_positive(a in arb_collection(), b in arb_collection()) {
        let merged = merge(&a, &b).merged;
        prop_assert!(merged.iter().all(|(_, q)| q >= 1));
    }

    #[test]
    fn prop_merge_all_matches_pairwise_fold(a in arb_collection(), b in arb_collection(), c in arb_collection()) {
        let folded = merge_all([&a, &b, &c]).merged;
        let pairwise = merge(&merge(&a, &b).merged, &c).merged;
        prop_assert_eq!(folded, pairwise);
    }
}

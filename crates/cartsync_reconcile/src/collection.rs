//! Immutable keyed-quantity snapshots.

use core::borrow::Borrow;
use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Quantity held for one item. Always at least 1 inside a collection.
pub type Quantity = u32;

// ─────────────────────────────────────────────────────────────────────────────
// ItemKey
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque item identifier (a product id, SKU, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for ItemKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&ItemKey> for ItemKey {
    fn from(key: &ItemKey) -> Self {
        key.clone()
    }
}

impl PartialEq<str> for ItemKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ItemKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InvariantViolation
// ─────────────────────────────────────────────────────────────────────────────

/// An entry with a non-positive quantity was offered to a collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("item '{key}' has non-positive quantity {quantity}")]
pub struct InvariantViolation {
    /// The offending key.
    pub key: ItemKey,
    /// The rejected quantity.
    pub quantity: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// QuantityCollection
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot mapping [`ItemKey`] to a positive [`Quantity`].
///
/// # Invariants
///
/// - No entry ever holds a quantity of zero or less; such entries are removed
///   rather than stored
/// - Iteration order is the key order, so equal collections iterate equally
/// - Cloning is O(1) and clones share storage; every mutator returns a new
///   snapshot and leaves `self` untouched
///
/// Quantities saturate at [`Quantity::MAX`] when added together.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct QuantityCollection {
    entries: Arc<BTreeMap<ItemKey, Quantity>>,
}

impl QuantityCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from raw entries.
    ///
    /// Entries with a quantity of zero or less are dropped (and logged).
    /// Repeated keys have their quantities summed.
    pub fn from_entries<I, K, Q>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Q)>,
        K: Into<ItemKey>,
        Q: Into<i64>,
    {
        let mut map = BTreeMap::new();
        for (key, quantity) in entries {
            let key = key.into();
            let quantity = quantity.into();
            match to_quantity(quantity) {
                Some(quantity) => add_into(&mut map, key, quantity),
                None => {
                    tracing::warn!(item = %key, quantity, "dropping non-positive quantity");
                }
            }
        }
        Self::from_map(map)
    }

    /// Builds a collection from raw entries, rejecting any non-positive quantity.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] encountered.
    pub fn try_from_entries<I, K, Q>(entries: I) -> Result<Self, InvariantViolation>
    where
        I: IntoIterator<Item = (K, Q)>,
        K: Into<ItemKey>,
        Q: Into<i64>,
    {
        let mut map = BTreeMap::new();
        for (key, quantity) in entries {
            let key = key.into();
            let quantity = quantity.into();
            let Some(valid) = to_quantity(quantity) else {
                return Err(InvariantViolation { key, quantity });
            };
            add_into(&mut map, key, valid);
        }
        Ok(Self::from_map(map))
    }

    pub(crate) fn from_map(map: BTreeMap<ItemKey, Quantity>) -> Self {
        debug_assert!(map.values().all(|q| *q > 0));
        Self {
            entries: Arc::new(map),
        }
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<ItemKey, Quantity> {
        &self.entries
    }

    /// Returns the quantity held for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Quantity> {
        self.entries.get(key).copied()
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the collection holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.entries.values().map(|q| u64::from(*q)).sum()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, Quantity)> + '_ {
        self.entries.iter().map(|(key, quantity)| (key, *quantity))
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &ItemKey> + '_ {
        self.entries.keys()
    }

    /// Returns a snapshot with `key` set to `quantity`; zero or less removes it.
    #[must_use]
    pub fn with_quantity(&self, key: impl Into<ItemKey>, quantity: i64) -> Self {
        let key = key.into();
        let mut map = (*self.entries).clone();
        match to_quantity(quantity) {
            Some(quantity) => {
                map.insert(key, quantity);
            }
            None => {
                map.remove(&key);
            }
        }
        Self::from_map(map)
    }

    /// Returns a snapshot with `by` added to `key`'s quantity.
    #[must_use]
    pub fn increment(&self, key: impl Into<ItemKey>, by: Quantity) -> Self {
        if by == 0 {
            return self.clone();
        }
        let mut map = (*self.entries).clone();
        add_into(&mut map, key.into(), by);
        Self::from_map(map)
    }

    /// Returns a snapshot with `by` subtracted from `key`'s quantity.
    ///
    /// Reaching zero removes the entry. Absent keys are left absent.
    #[must_use]
    pub fn decrement(&self, key: impl Into<ItemKey>, by: Quantity) -> Self {
        let key = key.into();
        let Some(current) = self.entries.get(&key).copied() else {
            return self.clone();
        };
        self.with_quantity(key, i64::from(current) - i64::from(by))
    }

    /// Returns a snapshot without `key`.
    #[must_use]
    pub fn without(&self, key: &str) -> Self {
        if !self.entries.contains_key(key) {
            return self.clone();
        }
        let mut map = (*self.entries).clone();
        map.remove(key);
        Self::from_map(map)
    }

    /// Returns the pointwise difference `self - other`.
    ///
    /// Entries that would drop to zero or below are removed; keys only present
    /// in `other` are ignored.
    #[must_use]
    pub fn subtract(&self, other: &QuantityCollection) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let map = self
            .entries
            .iter()
            .filter_map(|(key, quantity)| {
                let remaining = quantity.saturating_sub(other.get(key.as_str()).unwrap_or(0));
                (remaining > 0).then(|| (key.clone(), remaining))
            })
            .collect();
        Self::from_map(map)
    }
}

impl fmt::Debug for QuantityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, Q> FromIterator<(K, Q)> for QuantityCollection
where
    K: Into<ItemKey>,
    Q: Into<i64>,
{
    fn from_iter<I: IntoIterator<Item = (K, Q)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<'a> IntoIterator for &'a QuantityCollection {
    type Item = (&'a ItemKey, &'a Quantity);
    type IntoIter = std::collections::btree_map::Iter<'a, ItemKey, Quantity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for QuantityCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, quantity) in self.entries.iter() {
            map.serialize_entry(key, quantity)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for QuantityCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<ItemKey, i64>::deserialize(deserializer)?;
        Ok(Self::from_entries(raw))
    }
}

fn to_quantity(raw: i64) -> Option<Quantity> {
    if raw <= 0 {
        None
    } else {
        Some(Quantity::try_from(raw).unwrap_or(Quantity::MAX))
    }
}

fn add_into(map: &mut BTreeMap<ItemKey, Quantity>, key: ItemKey, quantity: Quantity) {
    map.entry(key)
        .and_modify(|existing| *existing = existing.saturating_add(quantity))
        .or_insert(quantity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_entries_are_never_stored() {
        let c = QuantityCollection::from_entries([("a", 0), ("b", -3), ("c", 2)]);
        assert_eq!(c.len(), 1);
        assert!(c.keys().eq(["c"]));
        assert!(!c.contains_key("a"));
    }

    #[test]
    fn duplicate_keys_are_summed() {
        let c = QuantityCollection::from_entries([("a", 1), ("a", 4)]);
        assert_eq!(c.get("a"), Some(5));
    }

    #[test]
    fn strict_constructor_rejects_non_positive() {
        let err = QuantityCollection::try_from_entries([("a", 1), ("b", 0)])
            .expect_err("zero quantity should be rejected");
        assert_eq!(err.key, "b");
        assert_eq!(err.quantity, 0);
    }

    #[test]
    fn mutators_leave_original_untouched() {
        let original = QuantityCollection::from_entries([("a", 2)]);

        let bumped = original.increment("a", 3);
        let added = original.with_quantity("b", 1);
        let removed = original.without("a");

        assert_eq!(original.get("a"), Some(2));
        assert_eq!(bumped.get("a"), Some(5));
        assert_eq!(added.len(), 2);
        assert!(removed.is_empty());
    }

    #[test]
    fn with_quantity_zero_removes() {
        let c = QuantityCollection::from_entries([("a", 2)]).with_quantity("a", 0);
        assert!(c.is_empty());
    }

    #[test]
    fn decrement_to_zero_removes() {
        let c = QuantityCollection::from_entries([("a", 2)]);
        assert_eq!(c.decrement("a", 1).get("a"), Some(1));
        assert!(c.decrement("a", 2).is_empty());
        assert!(c.decrement("a", 9).is_empty());
        assert_eq!(c.decrement("missing", 1), c);
    }

    #[test]
    fn subtract_removes_exhausted_entries() {
        let current = QuantityCollection::from_entries([("a", 3), ("b", 1), ("c", 2)]);
        let already = QuantityCollection::from_entries([("a", 1), ("b", 4), ("z", 9)]);

        let delta = current.subtract(&already);
        assert_eq!(delta, QuantityCollection::from_entries([("a", 2), ("c", 2)]));
        assert_eq!(current.subtract(&QuantityCollection::new()), current);
    }

    #[test]
    fn quantities_saturate() {
        let c = QuantityCollection::from_entries([("a", i64::from(Quantity::MAX))]).increment("a", 10);
        assert_eq!(c.get("a"), Some(Quantity::MAX));

        let huge = QuantityCollection::from_entries([("b", i64::MAX)]);
        assert_eq!(huge.get("b"), Some(Quantity::MAX));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = QuantityCollection::from_entries([("x", 1), ("y", 2)]);
        let b = QuantityCollection::from_entries([("y", 2), ("x", 1)]);
        assert_eq!(a, b);
        assert_ne!(a, b.increment("x", 1));
    }

    #[test]
    fn total_quantity_sums_entries() {
        let c = QuantityCollection::from_entries([("x", 3), ("y", 4)]);
        assert_eq!(c.total_quantity(), 7);
    }

    #[test]
    fn serializes_as_json_object() {
        let c = QuantityCollection::from_entries([("p2", 1), ("p1", 5)]);
        let json = serde_json::to_string(&c).expect("serialize");
        assert_eq!(json, r#"{"p1":5,"p2":1}"#);

        let empty = serde_json::to_string(&QuantityCollection::new()).expect("serialize");
        assert_eq!(empty, "{}");
    }

    #[test]
    fn deserialize_drops_non_positive_values() {
        let c: QuantityCollection =
            serde_json::from_str(r#"{"p1": 2, "p2": 0, "p3": -1}"#).expect("deserialize");
        assert_eq!(c, QuantityCollection::from_entries([("p1", 2)]));
    }

    #[test]
    fn deserialize_rejects_non_integer_values() {
        let result = serde_json::from_str::<QuantityCollection>(r#"{"p1": "two"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn debug_renders_as_map() {
        let c = QuantityCollection::from_entries([("p1", 2)]);
        assert_eq!(format!("{c:?}"), r#"{ItemKey("p1"): 2}"#);
    }
}

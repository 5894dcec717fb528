//! In-memory reference stores.
//!
//! Both stores hold immutable [`QuantityCollection`] snapshots behind a lock,
//! so readers never observe a partially applied write.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cartsync_reconcile::{ItemKey, Quantity, QuantityCollection};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::storage::{AnonymousStore, IdentifiedStore, IdentityToken, StorageError};

/// Anonymous store backed by process memory.
///
/// The generation is bumped by [`set_items`](Self::set_items) and `clear`.
#[derive(Debug, Default)]
pub struct InMemoryAnonymousStore {
    items: RwLock<QuantityCollection>,
    generation: AtomicU64,
}

impl InMemoryAnonymousStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `items`.
    #[must_use]
    pub fn with_items(items: QuantityCollection) -> Self {
        Self {
            items: RwLock::new(items),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> QuantityCollection {
        self.items.read().clone()
    }

    /// Adds `quantity` of `key`.
    pub fn add_item(&self, key: impl Into<ItemKey>, quantity: Quantity) {
        let mut items = self.items.write();
        *items = items.increment(key, quantity);
    }

    /// Removes `key` entirely.
    pub fn remove_item(&self, key: &str) {
        let mut items = self.items.write();
        *items = items.without(key);
    }

    /// Replaces the whole snapshot.
    pub fn set_items(&self, items: QuantityCollection) {
        let mut current = self.items.write();
        *current = items;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnonymousStore for InMemoryAnonymousStore {
    async fn fetch(&self) -> Result<QuantityCollection, StorageError> {
        Ok(self.snapshot())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.set_items(QuantityCollection::new());
        Ok(())
    }

    async fn generation(&self) -> Result<Option<u64>, StorageError> {
        Ok(Some(self.generation.load(Ordering::SeqCst)))
    }
}

/// Identity-scoped store backed by process memory.
///
/// Unknown identities read as an empty snapshot.
#[derive(Debug, Default)]
pub struct InMemoryIdentifiedStore {
    carts: RwLock<HashMap<IdentityToken, QuantityCollection>>,
}

impl InMemoryIdentifiedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot stored for `identity`.
    #[must_use]
    pub fn snapshot(&self, identity: &IdentityToken) -> QuantityCollection {
        self.carts.read().get(identity).cloned().unwrap_or_default()
    }

    /// Replaces the snapshot stored for `identity`.
    pub fn set_items(&self, identity: IdentityToken, items: QuantityCollection) {
        let mut carts = self.carts.write();
        if items.is_empty() {
            carts.remove(&identity);
        } else {
            carts.insert(identity, items);
        }
    }

    /// Number of identities holding a non-empty snapshot.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.carts.read().len()
    }
}

#[async_trait]
impl IdentifiedStore for InMemoryIdentifiedStore {
    async fn fetch(&self, identity: &IdentityToken) -> Result<QuantityCollection, StorageError> {
        Ok(self.snapshot(identity))
    }

    async fn write(
        &self,
        identity: &IdentityToken,
        items: QuantityCollection,
    ) -> Result<(), StorageError> {
        self.set_items(identity.clone(), items);
        Ok(())
    }
}

//! Shared test utilities for `cartsync_migration` integration tests.
//!
//! Provides stores wrapping the in-memory reference stores with scripted
//! failures and a shared call journal. Import via `mod common;`.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities — not all items used in every test binary"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use cartsync_migration::{
    AnonymousStore, Backend, ContextSwitchCoordinator, CoordinatorConfig, IdentifiedStore,
    IdentityToken, InMemoryAnonymousStore, InMemoryIdentifiedStore, StorageError,
};
use cartsync_reconcile::QuantityCollection;
use parking_lot::Mutex;

// ═══════════════════════════════════════════════════════════════════════════════
// CALL JOURNAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered record of every store call, shared by both stores of a fixture.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    fn record(&self, call: &'static str) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().iter().filter(|c| **c == call).count()
    }

    pub fn reset(&self) {
        self.0.lock().clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTED STORES
// ═══════════════════════════════════════════════════════════════════════════════

/// Anonymous store whose fetch and clear can be told to fail.
#[derive(Debug)]
pub struct ScriptedAnonymousStore {
    pub inner: InMemoryAnonymousStore,
    journal: Journal,
    fail_fetch: AtomicBool,
    clear_failures: AtomicU32,
}

impl ScriptedAnonymousStore {
    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `n` clear calls fail.
    pub fn fail_next_clears(&self, n: u32) {
        self.clear_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnonymousStore for ScriptedAnonymousStore {
    async fn fetch(&self) -> Result<QuantityCollection, StorageError> {
        self.journal.record("fetch_anonymous");
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StorageError::Fetch {
                backend: Backend::Anonymous,
                message: "disk unreadable".into(),
            });
        }
        self.inner.fetch().await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.journal.record("clear_anonymous");
        let failing = self
            .clear_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Clear {
                backend: Backend::Anonymous,
                message: "disk locked".into(),
            });
        }
        self.inner.clear().await
    }

    async fn generation(&self) -> Result<Option<u64>, StorageError> {
        self.inner.generation().await
    }
}

/// Identified store whose fetch and write can be told to fail.
#[derive(Debug)]
pub struct ScriptedIdentifiedStore {
    pub inner: InMemoryIdentifiedStore,
    journal: Journal,
    fail_fetch: AtomicBool,
    fail_write: AtomicBool,
}

impl ScriptedIdentifiedStore {
    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentifiedStore for ScriptedIdentifiedStore {
    async fn fetch(&self, identity: &IdentityToken) -> Result<QuantityCollection, StorageError> {
        self.journal.record("fetch_identified");
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                backend: Backend::Identified,
            });
        }
        self.inner.fetch(identity).await
    }

    async fn write(
        &self,
        identity: &IdentityToken,
        items: QuantityCollection,
    ) -> Result<(), StorageError> {
        self.journal.record("write_identified");
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                backend: Backend::Identified,
                message: "service unavailable".into(),
            });
        }
        self.inner.write(identity, items).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Fixture {
    pub anonymous: Arc<ScriptedAnonymousStore>,
    pub identified: Arc<ScriptedIdentifiedStore>,
    pub journal: Journal,
    pub coordinator: Arc<ContextSwitchCoordinator>,
}

impl Fixture {
    pub fn new(
        anonymous: QuantityCollection,
        identified: &[(IdentityToken, QuantityCollection)],
        config: CoordinatorConfig,
    ) -> Self {
        let journal = Journal::default();
        let anonymous = Arc::new(ScriptedAnonymousStore {
            inner: InMemoryAnonymousStore::with_items(anonymous),
            journal: journal.clone(),
            fail_fetch: AtomicBool::new(false),
            clear_failures: AtomicU32::new(0),
        });
        let inner = InMemoryIdentifiedStore::new();
        for (identity, items) in identified {
            inner.set_items(identity.clone(), items.clone());
        }
        let identified = Arc::new(ScriptedIdentifiedStore {
            inner,
            journal: journal.clone(),
            fail_fetch: AtomicBool::new(false),
            fail_write: AtomicBool::new(false),
        });
        let coordinator = Arc::new(ContextSwitchCoordinator::new(
            anonymous.clone(),
            identified.clone(),
            config,
        ));
        Self {
            anonymous,
            identified,
            journal,
            coordinator,
        }
    }

    pub fn anonymous_items(&self) -> QuantityCollection {
        self.anonymous.inner.snapshot()
    }

    pub fn identified_items(&self, identity: &IdentityToken) -> QuantityCollection {
        self.identified.inner.snapshot(identity)
    }

    /// Observes anonymous then `identity`, triggering one migration.
    pub async fn sign_in(&self, identity: &IdentityToken) -> cartsync_migration::Transition {
        self.coordinator.handle_context(None).await;
        self.coordinator
            .handle_context(Some(identity.clone()))
            .await
    }
}

pub fn items<const N: usize>(entries: [(&str, i64); N]) -> QuantityCollection {
    QuantityCollection::from_entries(entries)
}

pub fn user(name: &str) -> IdentityToken {
    IdentityToken::new(name)
}

//! Anonymous-to-identified migration coordinator.
//!
//! The [`ContextSwitchCoordinator`] observes an identity context stream and, on
//! the anonymous-to-identified edge only, runs four strictly sequential phases:
//!
//! 1. Fetch the anonymous snapshot
//! 2. Fetch the identified snapshot
//! 3. Merge, then write the merged snapshot to the identified store
//! 4. Clear the anonymous store (only after the write succeeded)
//!
//! Each phase is driven through its own [`Command`], so the surrounding
//! application can observe per-phase progress, while the sequencing and abort
//! rules live here.
//!
//! # Edge Detection
//!
//! | Previous | Next | Action |
//! |----------|------|--------|
//! | nothing observed | any | baseline only (see [`CoordinatorConfig::migrate_on_initial_identity`]) |
//! | anonymous | identified | migrate |
//! | identified | identified | ignored, even if the identity changed |
//! | any | anonymous | ignored |

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use cartsync_reactive::{
    ActionError, ActionResult, Command, Command0, Command1, Execution, Observable,
    ObservableError, Subscription,
};
use cartsync_reconcile::{ItemKey, QuantityCollection, merge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::CoordinatorConfig;
use crate::storage::{
    AnonymousStore, Backend, IdentifiedStore, IdentityContext, IdentityToken, StorageError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Phases
// ─────────────────────────────────────────────────────────────────────────────

/// The steps of one migration attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    /// Reading the anonymous store.
    FetchAnonymous,
    /// Reading the identified store.
    FetchIdentified,
    /// Writing the merged snapshot to the identified store.
    WriteIdentified,
    /// Clearing the anonymous store.
    ClearAnonymous,
}

impl MigrationPhase {
    /// The store this phase talks to.
    #[must_use]
    pub fn backend(self) -> Backend {
        match self {
            Self::FetchAnonymous | Self::ClearAnonymous => Backend::Anonymous,
            Self::FetchIdentified | Self::WriteIdentified => Backend::Identified,
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchAnonymous => "fetch_anonymous",
            Self::FetchIdentified => "fetch_identified",
            Self::WriteIdentified => "write_identified",
            Self::ClearAnonymous => "clear_anonymous",
        };
        f.write_str(name)
    }
}

/// The commands driving each phase.
///
/// Clones share state with the coordinator's own commands, so subscribing to
/// e.g. `write_identified.observe()` shows live progress. Executing them from
/// outside while a migration runs makes that migration abort on the busy phase.
#[derive(Clone)]
pub struct MigrationPhases {
    /// Reads the anonymous store and its generation.
    pub fetch_anonymous: Command0<AnonymousSnapshot>,
    /// Reads the identified store for an identity.
    pub fetch_identified: Command1<IdentityToken, QuantityCollection>,
    /// Writes a snapshot for an identity.
    pub write_identified: Command1<(IdentityToken, QuantityCollection), ()>,
    /// Clears the anonymous store.
    pub clear_anonymous: Command0<()>,
}

impl MigrationPhases {
    fn new(anonymous: &Arc<dyn AnonymousStore>, identified: &Arc<dyn IdentifiedStore>) -> Self {
        let store = Arc::clone(anonymous);
        let fetch_anonymous = Command::new0(move || {
            let store = Arc::clone(&store);
            async move {
                let items = store.fetch().await.map_err(ActionError::from_source)?;
                // Read after the fetch: a clear racing in between changes the
                // generation and is then treated as a changed store.
                let generation = match store.generation().await {
                    Ok(generation) => generation,
                    Err(err) => {
                        tracing::debug!(error = %err, "anonymous store generation unavailable");
                        None
                    }
                };
                Ok(AnonymousSnapshot { items, generation })
            }
        })
        .named(MigrationPhase::FetchAnonymous.to_string());

        let store = Arc::clone(identified);
        let fetch_identified = Command::new(move |identity: IdentityToken| {
            let store = Arc::clone(&store);
            async move { store.fetch(&identity).await.map_err(ActionError::from_source) }
        })
        .named(MigrationPhase::FetchIdentified.to_string());

        let store = Arc::clone(identified);
        let write_identified = Command::new(
            move |(identity, items): (IdentityToken, QuantityCollection)| {
                let store = Arc::clone(&store);
                async move {
                    store
                        .write(&identity, items)
                        .await
                        .map_err(ActionError::from_source)
                }
            },
        )
        .named(MigrationPhase::WriteIdentified.to_string());

        let store = Arc::clone(anonymous);
        let clear_anonymous = Command::new0(move || {
            let store = Arc::clone(&store);
            async move { store.clear().await.map_err(ActionError::from_source) }
        })
        .named(MigrationPhase::ClearAnonymous.to_string());

        Self {
            fetch_anonymous,
            fetch_identified,
            write_identified,
            clear_anonymous,
        }
    }
}

/// What the fetch-anonymous phase read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousSnapshot {
    /// The anonymous items.
    pub items: QuantityCollection,
    /// The store's generation right after the fetch, if it tracks one.
    pub generation: Option<u64>,
}

/// Anonymous items already written to an identity whose clear then failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitingClear {
    /// The identity the items were written to.
    pub identity: IdentityToken,
    /// The anonymous snapshot that was merged.
    pub items: QuantityCollection,
    /// The anonymous store's generation when `items` was fetched.
    pub generation: u64,
}

impl AwaitingClear {
    /// Whether `snapshot` provably still holds these items, unchanged since
    /// they were migrated to `identity`.
    fn still_held(&self, identity: &IdentityToken, snapshot: &AnonymousSnapshot) -> bool {
        self.identity == *identity
            && snapshot.generation == Some(self.generation)
            && self.items.subtract(&snapshot.items).is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of a migration whose write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Identifier of the attempt, as recorded in the `migration` span.
    pub attempt: String,
    /// The identity the items were migrated to.
    pub identity: IdentityToken,
    /// The snapshot written to the identified store.
    pub merged: QuantityCollection,
    /// Keys present on both sides, whose quantities were summed.
    pub conflicting_keys: BTreeSet<ItemKey>,
    /// Whether the anonymous store was cleared afterwards.
    pub anonymous_cleared: bool,
    /// Whether part of the anonymous snapshot had already been migrated to the
    /// same identity by an earlier attempt whose clear failed, and was
    /// therefore not merged again.
    pub resumed: bool,
}

/// Coordinator progress, published on [`ContextSwitchCoordinator::status`].
#[derive(Debug, Clone, Default)]
pub enum MigrationStatus {
    /// No migration has run yet.
    #[default]
    Idle,
    /// A migration is in flight.
    Migrating {
        /// Identifier of the attempt.
        attempt: String,
        /// Target identity.
        identity: IdentityToken,
    },
    /// The last migration wrote its merge.
    Completed(MigrationReport),
    /// The last migration stopped before writing; both stores are untouched.
    Aborted {
        /// Identifier of the attempt.
        attempt: String,
        /// The phase that failed.
        phase: MigrationPhase,
        /// Why it failed.
        error: ActionError,
    },
}

impl MigrationStatus {
    /// Returns `true` while a migration is in flight.
    #[must_use]
    pub fn is_migrating(&self) -> bool {
        matches!(self, Self::Migrating { .. })
    }
}

/// What [`ContextSwitchCoordinator::handle_context`] did with one context.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Not an anonymous-to-identified edge; nothing ran.
    Ignored,
    /// The merge was written to the identified store.
    Migrated(MigrationReport),
    /// A fetch or the write failed; neither store changed.
    Aborted {
        /// The phase that failed.
        phase: MigrationPhase,
        /// Why it failed.
        error: ActionError,
    },
}

/// Failure to attach a coordinator to an identity stream.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// The identity stream was disposed.
    #[error(transparent)]
    Observable(#[from] ObservableError),

    /// No Tokio runtime is available to host the worker task.
    #[error("attach must be called from within a Tokio runtime")]
    NoRuntime,
}

// ─────────────────────────────────────────────────────────────────────────────
// ContextSwitchCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Merges the anonymous items into the identified store on sign-in.
pub struct ContextSwitchCoordinator {
    phases: MigrationPhases,
    status: Observable<MigrationStatus>,
    config: CoordinatorConfig,
    /// Last observed context; `None` until the first observation.
    last_context: Mutex<Option<IdentityContext>>,
    /// Anonymous snapshot already written to the identified store but not cleared.
    awaiting_clear: Mutex<Option<AwaitingClear>>,
    /// Serializes migrations issued through direct calls.
    serial: tokio::sync::Mutex<()>,
}

impl ContextSwitchCoordinator {
    /// Creates a coordinator over the two stores.
    pub fn new(
        anonymous: Arc<dyn AnonymousStore>,
        identified: Arc<dyn IdentifiedStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let clear_attempts = config.clear_attempts;
        let config = config.with_clear_attempts(clear_attempts);
        Self {
            phases: MigrationPhases::new(&anonymous, &identified),
            status: Observable::new(MigrationStatus::Idle),
            config,
            last_context: Mutex::new(None),
            awaiting_clear: Mutex::new(None),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    /// Observable coordinator progress.
    #[must_use]
    pub fn status(&self) -> &Observable<MigrationStatus> {
        &self.status
    }

    /// The per-phase commands, for observing progress.
    #[must_use]
    pub fn phases(&self) -> &MigrationPhases {
        &self.phases
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The anonymous snapshot that was migrated but could not be cleared, if any.
    #[must_use]
    pub fn awaiting_clear(&self) -> Option<AwaitingClear> {
        self.awaiting_clear.lock().clone()
    }

    /// Records one observed identity context and migrates on the
    /// anonymous-to-identified edge.
    pub async fn handle_context(&self, context: IdentityContext) -> Transition {
        let previous = self.last_context.lock().replace(context.clone());

        let identity = match (previous, context) {
            (Some(None), Some(identity)) => identity,
            (None, Some(identity)) if self.config.migrate_on_initial_identity => identity,
            (previous, next) => {
                tracing::debug!(
                    previous = ?previous.flatten(),
                    next = ?next,
                    "identity context change ignored"
                );
                return Transition::Ignored;
            }
        };

        self.migrate(&identity).await
    }

    /// Runs the migration for `identity` unconditionally.
    ///
    /// Concurrent calls are queued and run one after another.
    pub async fn migrate(&self, identity: &IdentityToken) -> Transition {
        let _serial = self.serial.lock().await;
        let attempt = nanoid::nanoid!(10);
        let span = tracing::info_span!("migration", attempt = %attempt, identity = %identity);
        self.run_phases(attempt, identity.clone())
            .instrument(span)
            .await
    }

    async fn run_phases(&self, attempt: String, identity: IdentityToken) -> Transition {
        self.status.publish(MigrationStatus::Migrating {
            attempt: attempt.clone(),
            identity: identity.clone(),
        });

        let anonymous = match settle(self.phases.fetch_anonymous.run().await) {
            Ok(snapshot) => snapshot,
            Err(error) => return self.abort(attempt, MigrationPhase::FetchAnonymous, error),
        };

        let identified = match settle(
            self.phases
                .fetch_identified
                .execute(identity.clone())
                .await,
        ) {
            Ok(items) => items,
            Err(error) => return self.abort(attempt, MigrationPhase::FetchIdentified, error),
        };

        let remembered = self.awaiting_clear.lock().clone();
        let (fresh, resumed) = match remembered {
            Some(migrated) if migrated.still_held(&identity, &anonymous) => {
                tracing::info!(
                    migrated = migrated.items.len(),
                    "anonymous items from an earlier attempt are already migrated"
                );
                (anonymous.items.subtract(&migrated.items), true)
            }
            Some(migrated) => {
                // May count remembered items twice; never drops one.
                tracing::info!(
                    previous_identity = %migrated.identity,
                    "anonymous store changed since the unfinished clear; merging it in full"
                );
                *self.awaiting_clear.lock() = None;
                (anonymous.items.clone(), false)
            }
            None => (anonymous.items.clone(), false),
        };

        let outcome = merge(&fresh, &identified);
        if outcome.has_conflicts() {
            tracing::debug!(conflicts = ?outcome.conflicting_keys, "summed shared items");
        }

        if let Err(error) = settle(
            self.phases
                .write_identified
                .execute((identity.clone(), outcome.merged.clone()))
                .await,
        ) {
            return self.abort(attempt, MigrationPhase::WriteIdentified, error);
        }

        // Everything fetched from the anonymous store now lives in the
        // identified store, whether or not the clear below succeeds.
        let anonymous_cleared = self.clear_anonymous().await;
        let awaiting = match (anonymous_cleared, anonymous.generation) {
            (false, Some(generation)) => Some(AwaitingClear {
                identity: identity.clone(),
                items: anonymous.items,
                generation,
            }),
            _ => None,
        };
        *self.awaiting_clear.lock() = awaiting;

        let report = MigrationReport {
            attempt,
            identity,
            merged: outcome.merged,
            conflicting_keys: outcome.conflicting_keys,
            anonymous_cleared,
            resumed,
        };

        tracing::info!(
            items = report.merged.len(),
            conflicts = report.conflicting_keys.len(),
            cleared = report.anonymous_cleared,
            resumed = report.resumed,
            "migration completed"
        );
        self.status.publish(MigrationStatus::Completed(report.clone()));
        Transition::Migrated(report)
    }

    async fn clear_anonymous(&self) -> bool {
        let attempts = self.config.clear_attempts;
        for attempt in 1..=attempts {
            match settle(self.phases.clear_anonymous.run().await) {
                Ok(()) => return true,
                Err(error) => {
                    tracing::warn!(
                        phase = %MigrationPhase::ClearAnonymous,
                        backend = %MigrationPhase::ClearAnonymous.backend(),
                        attempt,
                        attempts,
                        error = %error,
                        "failed to clear anonymous store after a successful write"
                    );
                }
            }
        }
        false
    }

    fn abort(&self, attempt: String, phase: MigrationPhase, error: ActionError) -> Transition {
        let backend = error
            .source_ref()
            .and_then(|source| source.downcast_ref::<StorageError>())
            .map_or(phase.backend(), StorageError::backend);

        tracing::warn!(
            phase = %phase,
            backend = %backend,
            error = %error,
            "migration aborted; stores left unchanged"
        );

        self.status.publish(MigrationStatus::Aborted {
            attempt,
            phase,
            error: error.clone(),
        });
        Transition::Aborted { phase, error }
    }

    /// Subscribes to `contexts` and processes every emission on a worker task.
    ///
    /// Emissions are queued and handled strictly in order, so migrations never
    /// overlap. The value delivered at subscription time is the first
    /// observation and establishes the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`AttachError`] if `contexts` is disposed or no Tokio runtime is
    /// running.
    pub fn attach(
        self: &Arc<Self>,
        contexts: &Observable<IdentityContext>,
    ) -> Result<CoordinatorHandle, AttachError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AttachError::NoRuntime)?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<IdentityContext>();

        let subscription = contexts.subscribe(move |context: &IdentityContext| {
            if sender.send(context.clone()).is_err() {
                tracing::debug!("coordinator worker gone; dropping identity context");
            }
        })?;

        let coordinator = Arc::clone(self);
        let worker = runtime.spawn(async move {
            while let Some(context) = receiver.recv().await {
                coordinator.handle_context(context).await;
            }
            tracing::debug!("identity stream detached; coordinator worker exiting");
        });

        Ok(CoordinatorHandle {
            contexts: contexts.clone(),
            subscription,
            worker,
        })
    }
}

impl fmt::Debug for ContextSwitchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSwitchCoordinator")
            .field("status", &self.status.get())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Keeps a coordinator attached to an identity stream.
///
/// Dropping the handle leaves the coordinator attached; call
/// [`detach`](Self::detach) to stop observing.
pub struct CoordinatorHandle {
    contexts: Observable<IdentityContext>,
    subscription: Subscription,
    worker: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Stops observing and waits until every queued context has been handled.
    pub async fn detach(self) {
        self.contexts.unsubscribe(&self.subscription);
        if let Err(err) = self.worker.await {
            tracing::warn!(error = %err, "coordinator worker ended abnormally");
        }
    }
}

fn settle<T>(execution: Execution<T>) -> ActionResult<T> {
    match execution {
        Execution::Completed(result) => result,
        Execution::AlreadyRunning => Err(ActionError::operation(
            "phase command was already running",
        )),
    }
}

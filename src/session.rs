//! `InventorySession`: the service object a UI holds for one signed-in user.
//!
//! Owns the snapshot store, connectivity monitor, sync coordinator and
//! mutation gateway. All of them share one in-memory `InventoryState`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::config::SessionOptions;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::error::{InventoryError, Result};
use crate::events::ProductEvent;
use crate::gateway::{Mutation, MutationGateway, MutationReport};
use crate::remote::RemoteStore;
use crate::state::{InventoryState, SharedState};
use crate::storage::{KeyValueStore, SnapshotStore};
use crate::sync::{LocalWrites, Outbox, SyncCoordinator, SyncOutcome, SyncPhase};
use crate::types::{Category, HistoryEntry, NewHistoryEntry, Product, Stats, UserId};

/// Everything the UI renders, copied out of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryView {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub historial: Vec<HistoryEntry>,
    pub stats: Stats,
    pub is_online: bool,
    pub is_loading: bool,
    pub phase: SyncPhase,
    pub user: Option<UserId>,
}

pub struct InventorySession {
    auth: Arc<dyn AuthProvider>,
    connectivity: ConnectivityMonitor,
    snapshots: SnapshotStore,
    coordinator: SyncCoordinator,
    gateway: MutationGateway,
    outbox: Arc<Outbox>,
    state: SharedState,
    user: RwLock<Option<UserId>>,
    loading: AtomicBool,
}

impl InventorySession {
    /// Build a session, opening the snapshot store `options` describes.
    pub fn new(
        options: SessionOptions,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let store = options.open_store()?;
        Self::with_store(&options, store, remote, auth)
    }

    /// Build a session over an existing key-value store.
    pub fn with_store(
        options: &SessionOptions,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        options.validate()?;

        let snapshots = SnapshotStore::new(store);
        let state: SharedState = Arc::new(RwLock::new(InventoryState::default()));
        let outbox = Arc::new(Outbox::new(snapshots.clone(), options.outbox_limit));
        let writes = Arc::new(LocalWrites::new());
        let coordinator = SyncCoordinator::new(
            remote.clone(),
            snapshots.clone(),
            state.clone(),
            outbox.clone(),
            writes.clone(),
        );
        let gateway = MutationGateway::new(
            remote,
            snapshots.clone(),
            state.clone(),
            outbox.clone(),
            writes,
            options.write_policy,
        );

        Ok(Self {
            auth,
            connectivity: ConnectivityMonitor::new(options.initially_online),
            snapshots,
            coordinator,
            gateway,
            outbox,
            state,
            user: RwLock::new(None),
            loading: AtomicBool::new(true),
        })
    }

    /// Resolve the user and load their data.
    ///
    /// Online, the user comes from the auth provider and a sync cycle runs.
    /// Offline, or when the auth provider cannot be reached, the last user
    /// seen on this device is used and their snapshots are served.
    pub async fn start(&self) -> Result<SyncOutcome> {
        self.loading.store(true, Ordering::SeqCst);
        let outcome = self.resolve_and_load().await;
        self.loading.store(false, Ordering::SeqCst);
        outcome
    }

    async fn resolve_and_load(&self) -> Result<SyncOutcome> {
        if self.connectivity.is_online() {
            match self.auth.current_user().await {
                Ok(Some(user)) => {
                    self.adopt_user(&user)?;
                    info!(%user, "session started online");
                    return Ok(self.coordinator.sync(&user).await);
                }
                Ok(None) => return Err(InventoryError::NoUser),
                Err(e) => warn!(error = %e, "auth provider unavailable, using last known user"),
            }
        }

        let user = self.snapshots.last_user()?.ok_or(InventoryError::NoUser)?;
        self.adopt_user(&user)?;
        info!(%user, "session started from cache");
        Ok(self.coordinator.serve_from_cache(Some(&user)))
    }

    fn adopt_user(&self, user: &UserId) -> Result<()> {
        let previous = self.user.write().replace(user.clone());
        if previous.as_ref() != Some(user) {
            *self.state.write() = InventoryState::default();
        }
        self.snapshots.remember_user(user)?;
        self.outbox.load(user)
    }

    /// React to a connectivity transition: sync on `BecameOnline`, serve the
    /// cache on `BecameOffline`.
    pub async fn handle_connectivity(&self, event: ConnectivityEvent) -> Result<SyncOutcome> {
        let user = self.current_user();
        match (event, user) {
            (ConnectivityEvent::BecameOnline, Some(user)) => {
                Ok(self.sync_with_loading(&user).await)
            }
            (ConnectivityEvent::BecameOnline, None) => self.start().await,
            (ConnectivityEvent::BecameOffline, user) => {
                Ok(self.coordinator.serve_from_cache(user.as_ref()))
            }
        }
    }

    /// Report the platform's reachability and handle the resulting
    /// transition, if any. Use this or `spawn_connectivity_listener`, not both.
    pub async fn set_online(&self, online: bool) -> Option<Result<SyncOutcome>> {
        let event = self.connectivity.set_online(online)?;
        Some(self.handle_connectivity(event).await)
    }

    /// Run `handle_connectivity` for every transition reported to
    /// `connectivity()`. The task ends when the session is dropped.
    pub fn spawn_connectivity_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut watcher = self.connectivity.subscribe();
        let session = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = watcher.next_event().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(e) = session.handle_connectivity(event).await {
                    warn!(?event, error = %e, "connectivity transition not handled");
                }
            }
        })
    }

    /// Explicit retry: sync now if online, otherwise serve the cache.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        let user = self.current_user().ok_or(InventoryError::NoUser)?;
        if self.connectivity.is_online() {
            Ok(self.sync_with_loading(&user).await)
        } else {
            Ok(self.coordinator.serve_from_cache(Some(&user)))
        }
    }

    async fn sync_with_loading(&self, user: &UserId) -> SyncOutcome {
        self.loading.store(true, Ordering::SeqCst);
        let outcome = self.coordinator.sync(user).await;
        self.loading.store(false, Ordering::SeqCst);
        outcome
    }

    pub fn view(&self) -> InventoryView {
        let state = self.state.read();
        InventoryView {
            products: state.products.clone(),
            categories: state.categories.clone(),
            historial: state.historial.clone(),
            stats: state.stats.clone(),
            is_online: self.connectivity.is_online(),
            is_loading: self.loading.load(Ordering::SeqCst),
            phase: self.coordinator.phase(),
            user: self.current_user(),
        }
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user.read().clone()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.coordinator.subscribe_phase()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProductEvent> {
        self.gateway.subscribe_events()
    }

    /// Remote writes waiting in the outbox.
    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Apply `mutation` locally, then write it through.
    ///
    /// Memory and snapshots are updated on the first poll, but the returned
    /// future resolves only once the remote write has finished. Callers that
    /// must not wait on the network can `tokio::spawn` it on an
    /// `Arc<InventorySession>`.
    pub async fn apply(&self, mutation: Mutation) -> Result<MutationReport> {
        let user = self.current_user();
        self.gateway
            .apply(user.as_ref(), mutation, self.connectivity.is_online())
            .await
    }

    pub async fn update_products(&self, products: Vec<Product>) -> Result<MutationReport> {
        self.apply(Mutation::ReplaceProducts(products)).await
    }

    pub async fn update_categories(&self, categories: Vec<Category>) -> Result<MutationReport> {
        self.apply(Mutation::ReplaceCategories(categories)).await
    }

    pub async fn update_historial(&self, historial: Vec<HistoryEntry>) -> Result<MutationReport> {
        self.apply(Mutation::ReplaceHistory(historial)).await
    }

    pub async fn add_historial_entry(&self, entry: NewHistoryEntry) -> Result<MutationReport> {
        self.apply(Mutation::AppendHistory(entry)).await
    }

    // ------------------------------------------------------------------------
    // Logout
    // ------------------------------------------------------------------------

    /// Drop the current user's data from memory and the snapshot store.
    /// Any sync in flight is superseded.
    pub fn clear_cache(&self) -> Result<()> {
        self.coordinator.supersede();
        let user = self.user.write().take();
        *self.state.write() = InventoryState::default();
        self.outbox.reset();
        self.coordinator.set_idle();

        if let Some(user) = user {
            self.snapshots.clear(&user)?;
            info!(%user, "session cache cleared");
        }
        Ok(())
    }

    /// Sign out with the auth provider, then `clear_cache`. Local data is
    /// cleared even if the provider cannot be reached.
    pub async fn sign_out(&self) -> Result<()> {
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "remote sign-out failed, clearing local session anyway");
        }
        self.clear_cache()
    }
}

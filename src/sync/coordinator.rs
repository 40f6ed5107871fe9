//! Sync Coordinator: pulls the three remote tables into memory and snapshots.
//!
//! Each cycle takes a generation ticket and commits only while the ticket is
//! still the latest. Offline transitions, logout, and newer cycles bump the
//! generation, so a slow cycle that finishes late is discarded instead of
//! overwriting newer state. A local mutation that lands while the tables are
//! being fetched makes the cycle fetch again once the mutation has settled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{InventoryError, Result};
use crate::remote::{RemoteStore, SelectQuery};
use crate::state::{InventoryState, SharedState};
use crate::storage::SnapshotStore;
use crate::types::{Category, HistoryEntry, Product, RemoteTable, Table, UserId};

use super::outbox::Outbox;
use super::types::{SyncCounts, SyncOutcome, SyncPhase};
use super::writes::LocalWrites;

/// Tables written by a committed cycle.
const SYNCED_TABLES: [Table; 4] = [
    Table::Products,
    Table::Categories,
    Table::History,
    Table::Stats,
];

/// Fetch passes per cycle before giving up on a busy writer.
const MAX_FETCH_PASSES: usize = 3;

pub struct SyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    snapshots: SnapshotStore,
    state: SharedState,
    outbox: Arc<Outbox>,
    writes: Arc<LocalWrites>,
    phase: watch::Sender<SyncPhase>,
    generation: AtomicU64,
}

/// How a commit attempt ended.
enum Commit {
    Done(SyncOutcome),
    /// A local mutation started after the fetch did.
    Stale,
}

impl SyncCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: SnapshotStore,
        state: SharedState,
        outbox: Arc<Outbox>,
        writes: Arc<LocalWrites>,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            remote,
            snapshots,
            state,
            outbox,
            writes,
            phase,
            generation: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Invalidate any cycle in flight. Its results will be dropped.
    pub fn supersede(&self) {
        // Under the write lock so a cycle cannot pass its ticket check and then
        // commit after this returns.
        let _state = self.state.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_idle(&self) {
        self.phase.send_replace(SyncPhase::Idle);
    }

    /// Run one full cycle for `user`.
    ///
    /// Queued outbox writes are replayed first. The three tables are then
    /// fetched concurrently. If all succeed, memory and snapshots are replaced
    /// and stats recomputed; if any fails, memory is reloaded from the local
    /// snapshots and the phase becomes `SyncFailed`.
    ///
    /// Fetching waits for in-flight mutations to finish. If another one starts
    /// before the commit, the fetch is repeated so the committed rows include
    /// it. A cycle that cannot get a quiet pass returns `Superseded` and leaves
    /// memory as it is.
    pub async fn sync(&self, user: &UserId) -> SyncOutcome {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.phase.send_replace(SyncPhase::Syncing);
        info!(%user, ticket, "sync started");

        let replayed = self.replay_outbox(user).await;

        for pass in 1..=MAX_FETCH_PASSES {
            let revision = self.writes.settled().await;
            let (products, categories, history) = tokio::join!(
                self.fetch::<Product>(RemoteTable::Products, SelectQuery::all()),
                self.fetch::<Category>(RemoteTable::Categories, SelectQuery::all()),
                self.fetch::<HistoryEntry>(
                    RemoteTable::History,
                    SelectQuery::all().order_by("fecha", false),
                ),
            );

            let fetched = match (products, categories, history) {
                (Ok(products), Ok(categories), Ok(history)) => {
                    InventoryState::new(products, categories, history)
                }
                (Err(error), _, _) | (_, Err(error), _) | (_, _, Err(error)) => {
                    return self.fall_back(ticket, user, error);
                }
            };
            match self.commit(ticket, revision, user, fetched, replayed) {
                Commit::Done(outcome) => return outcome,
                Commit::Stale => {
                    debug!(%user, ticket, pass, "local write during fetch, fetching again");
                }
            }
        }

        let _state = self.state.write();
        if self.is_current(ticket) {
            warn!(%user, ticket, "local writes kept landing, sync abandoned");
            self.phase.send_replace(previous);
        }
        SyncOutcome::Superseded
    }

    /// Stop syncing and serve `user`'s snapshots. Memory is only reloaded
    /// when it holds nothing, so rows written while offline stay visible.
    pub fn serve_from_cache(&self, user: Option<&UserId>) -> SyncOutcome {
        let mut state = self.state.write();
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(user) = user {
            if state.is_empty() {
                match InventoryState::from_snapshots(&self.snapshots, user) {
                    Ok(cached) => *state = cached,
                    Err(e) => warn!(%user, error = %e, "could not load cached snapshot"),
                }
            }
        }
        self.phase.send_replace(SyncPhase::ServingFromCache);
        info!(user = user.map(UserId::as_str), "serving from cache");
        SyncOutcome::FromCache
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    async fn replay_outbox(&self, user: &UserId) -> usize {
        let _flush = self.outbox.lock_flush().await;
        if self.outbox.is_empty() {
            return 0;
        }
        match self.outbox.replay(user, self.remote.as_ref()).await {
            Ok(report) => {
                debug!(
                    %user,
                    applied = report.applied,
                    dropped = report.dropped,
                    remaining = report.remaining,
                    "outbox replayed"
                );
                report.applied
            }
            Err(e) => {
                warn!(%user, error = %e, "outbox replay failed");
                0
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        table: RemoteTable,
        query: SelectQuery,
    ) -> Result<Vec<T>> {
        let rows = self
            .remote
            .select(table, &query)
            .await
            .map_err(|e| InventoryError::from_remote(table, e))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| InventoryError::RemoteRejected {
                    table: table.to_string(),
                    message: format!("malformed row: {e}"),
                })
            })
            .collect()
    }

    fn commit(
        &self,
        ticket: u64,
        revision: u64,
        user: &UserId,
        fetched: InventoryState,
        replayed: usize,
    ) -> Commit {
        let mut state = self.state.write();
        if !self.is_current(ticket) {
            debug!(%user, ticket, "sync superseded, discarding fetched rows");
            return Commit::Done(SyncOutcome::Superseded);
        }
        if self.writes.revision() != revision {
            return Commit::Stale;
        }

        if let Err(e) = fetched.save(&self.snapshots, user, &SYNCED_TABLES) {
            warn!(%user, error = %e, "failed to persist synced snapshot");
        }

        let counts = SyncCounts {
            products: fetched.products.len(),
            categories: fetched.categories.len(),
            history: fetched.historial.len(),
            replayed,
        };
        *state = fetched;
        self.phase.send_replace(SyncPhase::Synced);
        info!(
            %user,
            products = counts.products,
            categories = counts.categories,
            history = counts.history,
            "sync complete"
        );
        Commit::Done(SyncOutcome::Synced(counts))
    }

    fn fall_back(&self, ticket: u64, user: &UserId, error: InventoryError) -> SyncOutcome {
        let mut state = self.state.write();
        if !self.is_current(ticket) {
            debug!(%user, ticket, error = %error, "superseded sync failed");
            return SyncOutcome::Superseded;
        }

        // Mutations save their snapshots before touching memory, so this
        // reload keeps them.
        warn!(%user, error = %error, "sync failed, serving cached snapshot");
        match InventoryState::from_snapshots(&self.snapshots, user) {
            Ok(cached) => *state = cached,
            Err(e) => warn!(%user, error = %e, "could not load cached snapshot"),
        }
        self.phase.send_replace(SyncPhase::SyncFailed);
        SyncOutcome::Failed { error }
    }
}

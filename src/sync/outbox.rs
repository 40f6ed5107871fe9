//! Outbox: remote writes waiting for connectivity.
//!
//! Only used under `WritePolicy::Outbox`. Entries are persisted as the user's
//! `outbox` snapshot so they survive a restart, and replayed in order before
//! the next sync cycle fetches.

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, warn};

use crate::error::{InventoryError, Result};
use crate::remote::{RemoteStore, RemoteWrite};
use crate::storage::SnapshotStore;
use crate::types::{Table, UserId};

/// What a replay pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    /// Rejected by the remote and discarded.
    pub dropped: usize,
    /// Still queued because the remote became unreachable mid-replay.
    pub remaining: usize,
}

pub struct Outbox {
    snapshots: SnapshotStore,
    pending: Mutex<Vec<RemoteWrite>>,
    limit: usize,
    flush: AsyncMutex<()>,
}

impl Outbox {
    pub fn new(snapshots: SnapshotStore, limit: usize) -> Self {
        Self {
            snapshots,
            pending: Mutex::new(Vec::new()),
            limit,
            flush: AsyncMutex::new(()),
        }
    }

    /// Replace the in-memory queue with `user`'s persisted one.
    pub fn load(&self, user: &UserId) -> Result<()> {
        let writes: Vec<RemoteWrite> = self.snapshots.load(user, Table::Outbox)?;
        *self.pending.lock() = writes;
        Ok(())
    }

    /// Queue writes, dropping the oldest entries beyond the limit. Returns the
    /// number dropped.
    pub fn enqueue(
        &self,
        user: &UserId,
        writes: impl IntoIterator<Item = RemoteWrite>,
    ) -> Result<usize> {
        let mut pending = self.pending.lock();
        pending.extend(writes);

        let overflow = pending.len().saturating_sub(self.limit);
        if overflow > 0 {
            pending.drain(..overflow);
            warn!(%user, dropped = overflow, "outbox full, dropping oldest writes");
        }
        self.snapshots.save(user, Table::Outbox, pending.as_slice())?;
        Ok(overflow)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn pending(&self) -> Vec<RemoteWrite> {
        self.pending.lock().clone()
    }

    /// Forget queued writes in memory. The persisted copy is removed by
    /// `SnapshotStore::clear`.
    pub fn reset(&self) {
        self.pending.lock().clear();
    }

    /// Held by whoever is delivering remote writes while the queue may be
    /// non-empty, so a replay and a direct write never interleave.
    pub async fn lock_flush(&self) -> AsyncMutexGuard<'_, ()> {
        self.flush.lock().await
    }

    /// Deliver queued writes in order. Callers hold `lock_flush`.
    ///
    /// Stops at the first `Unavailable` failure and keeps that entry and
    /// everything after it. Entries the remote rejects are dropped.
    pub async fn replay(&self, user: &UserId, remote: &dyn RemoteStore) -> Result<ReplayReport> {
        let batch: Vec<RemoteWrite> = self.pending.lock().drain(..).collect();
        let mut report = ReplayReport::default();
        let mut processed = 0;

        for write in &batch {
            match write.execute(remote).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    let err = InventoryError::from_remote(write.table, e);
                    if err.is_unavailable() {
                        debug!(%user, error = %err, "outbox replay paused");
                        break;
                    }
                    warn!(
                        %user,
                        table = %write.table,
                        op = write.op.name(),
                        error = %err,
                        "dropping rejected outbox write"
                    );
                    report.dropped += 1;
                }
            }
            processed += 1;
        }

        let remaining: Vec<RemoteWrite> = batch.into_iter().skip(processed).collect();
        report.remaining = remaining.len();

        let mut pending = self.pending.lock();
        // Unsent entries go back ahead of anything queued during the replay.
        pending.splice(0..0, remaining);
        self.snapshots.save(user, Table::Outbox, pending.as_slice())?;
        Ok(report)
    }
}

//! Mutation Gateway: local-first writes.
//!
//! A mutation is applied to memory and the user's snapshots before any remote
//! call is made, and a remote failure never undoes it. What happens to the
//! remote write depends on the `WritePolicy`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::WritePolicy;
use crate::error::{InventoryError, Result};
use crate::events::{next_history_id, HistoryWriter, ProductEvent};
use crate::remote::{RemoteOp, RemoteStore, RemoteWrite, RowMatch};
use crate::state::{InventoryState, SharedState};
use crate::storage::SnapshotStore;
use crate::sync::{LocalWrites, Outbox, WriteGuard};
use crate::types::{
    Category, HistoryEntry, Keyed, NewHistoryEntry, Product, RemoteTable, Stats, Table, UserId,
};

const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Mutations
// ============================================================================

/// A single-row write against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOp<T> {
    Insert(T),
    Update(T),
    Delete(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Product writes also append a synthesized history entry.
    Product(TableOp<Product>),
    Category(TableOp<Category>),
    /// History is append-only: only `Insert` is accepted.
    History(TableOp<HistoryEntry>),
    /// Replace the whole table locally and upsert it remotely.
    ReplaceProducts(Vec<Product>),
    ReplaceCategories(Vec<Category>),
    ReplaceHistory(Vec<HistoryEntry>),
    /// Record a movement; id and timestamp are assigned here.
    AppendHistory(NewHistoryEntry),
}

/// What became of the remote half of a mutation.
#[derive(Debug)]
pub enum RemoteStatus {
    Confirmed,
    /// Offline under `WriteBehind`: the next sync overwrites local state.
    SkippedOffline,
    /// Held in the outbox until the next sync cycle.
    Queued,
    /// The local write stands; local and remote have diverged.
    Failed(InventoryError),
}

#[derive(Debug)]
pub struct MutationReport {
    pub remote: RemoteStatus,
    /// History row synthesized or appended by this mutation.
    pub history_entry: Option<HistoryEntry>,
    pub stats: Stats,
}

impl MutationReport {
    pub fn remote_error(&self) -> Option<&InventoryError> {
        match &self.remote {
            RemoteStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Surface a failed remote write as an error. The local write has been
    /// kept either way.
    pub fn into_result(self) -> Result<Self> {
        match self.remote {
            RemoteStatus::Failed(e) => Err(e),
            _ => Ok(self),
        }
    }
}

/// Result of applying a mutation to a copy of the in-memory state.
struct LocalChange {
    writes: Vec<RemoteWrite>,
    event: Option<ProductEvent>,
    history_entry: Option<HistoryEntry>,
    touched: Vec<Table>,
}

// ============================================================================
// MutationGateway
// ============================================================================

pub struct MutationGateway {
    remote: Arc<dyn RemoteStore>,
    snapshots: SnapshotStore,
    state: SharedState,
    outbox: Arc<Outbox>,
    writes: Arc<LocalWrites>,
    policy: WritePolicy,
    history: HistoryWriter,
    events: broadcast::Sender<ProductEvent>,
}

impl MutationGateway {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        snapshots: SnapshotStore,
        state: SharedState,
        outbox: Arc<Outbox>,
        writes: Arc<LocalWrites>,
        policy: WritePolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            snapshots,
            state,
            outbox,
            writes,
            policy,
            history: HistoryWriter,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProductEvent> {
        self.events.subscribe()
    }

    /// Apply `mutation` for `user`.
    ///
    /// Errors only when the mutation cannot be applied locally (`NoUser`,
    /// `NotFound`, `InvalidRow`, storage failure). Remote outcomes are in the
    /// report.
    ///
    /// A sync cycle that is fetching while this runs will not commit until
    /// the remote write below has finished, and then fetches again.
    pub async fn apply(
        &self,
        user: Option<&UserId>,
        mutation: Mutation,
        online: bool,
    ) -> Result<MutationReport> {
        let user = user.ok_or(InventoryError::NoUser)?;
        let (change, stats, _in_flight) = self.apply_locally(user, mutation, Utc::now())?;

        if let Some(event) = change.event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        let remote = self.write_remote(user, change.writes, online).await?;
        Ok(MutationReport {
            remote,
            history_entry: change.history_entry,
            stats,
        })
    }

    fn apply_locally(
        &self,
        user: &UserId,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<(LocalChange, Stats, WriteGuard<'_>)> {
        let mut state = self.state.write();
        let guard = self.writes.begin();
        let mut next = state.clone();
        let mut change = self.change(&mut next, mutation, now)?;
        next.recompute_stats();

        change.touched.push(Table::Stats);
        next.save(&self.snapshots, user, &change.touched)?;

        let stats = next.stats.clone();
        *state = next;
        debug!(%user, tables = ?change.touched, "mutation applied locally");
        Ok((change, stats, guard))
    }

    fn change(
        &self,
        state: &mut InventoryState,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<LocalChange> {
        match mutation {
            Mutation::Product(op) => {
                if let TableOp::Insert(p) | TableOp::Update(p) = &op {
                    p.validate()?;
                }
                let (change, write) = apply_row_op(&mut state.products, op, RemoteTable::Products)?;
                let event = match change {
                    RowChange::Inserted(p) => ProductEvent::Created(p),
                    RowChange::Updated { before, after } => ProductEvent::Updated { before, after },
                    RowChange::Deleted(p) => ProductEvent::Deleted(p),
                };
                let entry = self.history.append(&event, &mut state.historial, now)?;
                Ok(LocalChange {
                    writes: vec![write, insert_write(RemoteTable::History, &entry)?],
                    event: Some(event),
                    history_entry: Some(entry),
                    touched: vec![Table::Products, Table::History],
                })
            }
            Mutation::Category(op) => {
                let (_, write) = apply_row_op(&mut state.categories, op, RemoteTable::Categories)?;
                Ok(LocalChange::single(write, Table::Categories))
            }
            Mutation::History(TableOp::Insert(entry)) => {
                if state.historial.iter().any(|e| e.id == entry.id) {
                    return Err(InventoryError::InvalidRow(format!(
                        "history row {} already exists",
                        entry.id
                    )));
                }
                let write = insert_write(RemoteTable::History, &entry)?;
                state.historial.insert(0, entry.clone());
                Ok(LocalChange {
                    history_entry: Some(entry),
                    ..LocalChange::single(write, Table::History)
                })
            }
            Mutation::History(_) => Err(InventoryError::InvalidRow(
                "history entries cannot be updated or deleted".to_string(),
            )),
            Mutation::ReplaceProducts(products) => {
                products.iter().try_for_each(Product::validate)?;
                let write = upsert_write(RemoteTable::Products, &products)?;
                state.products = products;
                Ok(LocalChange::single(write, Table::Products))
            }
            Mutation::ReplaceCategories(categories) => {
                let write = upsert_write(RemoteTable::Categories, &categories)?;
                state.categories = categories;
                Ok(LocalChange::single(write, Table::Categories))
            }
            Mutation::ReplaceHistory(history) => {
                let write = upsert_write(RemoteTable::History, &history)?;
                state.historial = history;
                Ok(LocalChange::single(write, Table::History))
            }
            Mutation::AppendHistory(new) => {
                let entry = HistoryEntry {
                    id: next_history_id(&state.historial)?,
                    producto_id: new.producto_id,
                    tipo_movimiento: new.tipo_movimiento,
                    cantidad: new.cantidad,
                    fecha: now,
                    observaciones: new.observaciones,
                };
                let write = insert_write(RemoteTable::History, &entry)?;
                state.historial.insert(0, entry.clone());
                Ok(LocalChange {
                    history_entry: Some(entry),
                    ..LocalChange::single(write, Table::History)
                })
            }
        }
    }

    async fn write_remote(
        &self,
        user: &UserId,
        writes: Vec<RemoteWrite>,
        online: bool,
    ) -> Result<RemoteStatus> {
        match (self.policy, online) {
            (WritePolicy::WriteBehind, false) => {
                debug!(%user, writes = writes.len(), "offline, remote write skipped");
                Ok(RemoteStatus::SkippedOffline)
            }
            (WritePolicy::Outbox, false) => {
                self.outbox.enqueue(user, writes)?;
                Ok(RemoteStatus::Queued)
            }
            (WritePolicy::WriteBehind, true) => Ok(self.deliver(user, &writes).await.1),
            (WritePolicy::Outbox, true) => {
                // Earlier writes must land first, including ones another
                // caller is replaying right now.
                let _flush = self.outbox.lock_flush().await;
                if !self.outbox.is_empty() {
                    self.outbox.replay(user, self.remote.as_ref()).await?;
                    if !self.outbox.is_empty() {
                        self.outbox.enqueue(user, writes)?;
                        return Ok(RemoteStatus::Queued);
                    }
                }
                match self.deliver(user, &writes).await {
                    (delivered, RemoteStatus::Failed(e)) if e.is_unavailable() => {
                        debug!(%user, error = %e, "remote unreachable, queueing write");
                        self.outbox.enqueue(user, writes.into_iter().skip(delivered))?;
                        Ok(RemoteStatus::Queued)
                    }
                    (_, status) => Ok(status),
                }
            }
        }
    }

    /// Send `writes` in order, stopping at the first failure. Also returns how
    /// many writes landed.
    async fn deliver(&self, user: &UserId, writes: &[RemoteWrite]) -> (usize, RemoteStatus) {
        for (delivered, write) in writes.iter().enumerate() {
            if let Err(e) = write.execute(self.remote.as_ref()).await {
                let err = InventoryError::from_remote(write.table, e);
                warn!(
                    %user,
                    table = %write.table,
                    op = write.op.name(),
                    error = %err,
                    "remote write failed, local state kept"
                );
                return (delivered, RemoteStatus::Failed(err));
            }
        }
        (writes.len(), RemoteStatus::Confirmed)
    }
}

impl LocalChange {
    fn single(write: RemoteWrite, table: Table) -> Self {
        Self {
            writes: vec![write],
            event: None,
            history_entry: None,
            touched: vec![table],
        }
    }
}

enum RowChange<T> {
    Inserted(T),
    Updated { before: T, after: T },
    Deleted(T),
}

/// Apply one keyed-row op to `rows` and build the matching remote write.
fn apply_row_op<T>(
    rows: &mut Vec<T>,
    op: TableOp<T>,
    table: RemoteTable,
) -> Result<(RowChange<T>, RemoteWrite)>
where
    T: Keyed + Clone + Serialize,
{
    let position = |rows: &[T], id: i64| rows.iter().position(|r| r.key() == id);
    let not_found = |id: i64| InventoryError::NotFound {
        table: table.to_string(),
        id,
    };

    match op {
        TableOp::Insert(row) => {
            if position(rows, row.key()).is_some() {
                return Err(InventoryError::InvalidRow(format!(
                    "{table} row {} already exists",
                    row.key()
                )));
            }
            let write = insert_write(table, &row)?;
            rows.push(row.clone());
            Ok((RowChange::Inserted(row), write))
        }
        TableOp::Update(row) => {
            let id = row.key();
            let i = position(rows, id).ok_or_else(|| not_found(id))?;
            let write = RemoteWrite::new(
                table,
                RemoteOp::Update {
                    row: serde_json::to_value(&row)?,
                    matcher: RowMatch::id(id),
                },
            );
            let before = std::mem::replace(&mut rows[i], row.clone());
            Ok((RowChange::Updated { before, after: row }, write))
        }
        TableOp::Delete(id) => {
            let i = position(rows, id).ok_or_else(|| not_found(id))?;
            let removed = rows.remove(i);
            let write = RemoteWrite::new(
                table,
                RemoteOp::Delete {
                    matcher: RowMatch::id(id),
                },
            );
            Ok((RowChange::Deleted(removed), write))
        }
    }
}

fn insert_write<T: Serialize>(table: RemoteTable, row: &T) -> Result<RemoteWrite> {
    Ok(RemoteWrite::new(
        table,
        RemoteOp::Insert {
            rows: vec![serde_json::to_value(row)?],
        },
    ))
}

fn upsert_write<T: Serialize>(table: RemoteTable, rows: &[T]) -> Result<RemoteWrite> {
    let rows = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<Value>>>()?;
    Ok(RemoteWrite::new(table, RemoteOp::Upsert { rows }))
}

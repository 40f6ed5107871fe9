//! In-memory table state shared by the sync coordinator and the gateway.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::stats::compute_stats;
use crate::storage::SnapshotStore;
use crate::types::{Category, HistoryEntry, Product, Stats, Table, UserId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryState {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub historial: Vec<HistoryEntry>,
    pub stats: Stats,
}

/// Only the coordinator and the gateway write through this lock; neither
/// holds it across an `.await`.
pub type SharedState = Arc<RwLock<InventoryState>>;

impl InventoryState {
    pub fn new(
        products: Vec<Product>,
        categories: Vec<Category>,
        historial: Vec<HistoryEntry>,
    ) -> Self {
        let stats = compute_stats(&products, &historial);
        Self {
            products,
            categories,
            historial,
            stats,
        }
    }

    /// Build state from the user's snapshots. Stats are recomputed rather than
    /// read back, so a stale stats snapshot cannot disagree with the rows.
    pub fn from_snapshots(snapshots: &SnapshotStore, user: &UserId) -> Result<Self> {
        Ok(Self::new(
            snapshots.load(user, Table::Products)?,
            snapshots.load(user, Table::Categories)?,
            snapshots.load(user, Table::History)?,
        ))
    }

    /// True when no table holds any row.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.categories.is_empty() && self.historial.is_empty()
    }

    pub fn recompute_stats(&mut self) {
        self.stats = compute_stats(&self.products, &self.historial);
    }

    /// Persist the given tables (and stats) for `user`.
    pub fn save(&self, snapshots: &SnapshotStore, user: &UserId, tables: &[Table]) -> Result<()> {
        for table in tables {
            match table {
                Table::Products => snapshots.save(user, Table::Products, &self.products)?,
                Table::Categories => snapshots.save(user, Table::Categories, &self.categories)?,
                Table::History => snapshots.save(user, Table::History, &self.historial)?,
                Table::Stats => snapshots.save_stats(user, &self.stats)?,
                Table::Outbox => {}
            }
        }
        Ok(())
    }
}

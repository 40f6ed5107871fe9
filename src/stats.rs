//! Statistics Aggregator.

use crate::types::{HistoryEntry, MovementKind, Product, Stats};

/// Products with `0 < stock < LOW_STOCK_THRESHOLD` count as low stock.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// Number of movements kept in `Stats::recent_movements`.
pub const RECENT_MOVEMENTS: usize = 5;

/// Derive dashboard figures from the current product and history rows.
///
/// Total over any input; empty slices give an all-zero `Stats`.
pub fn compute_stats(products: &[Product], history: &[HistoryEntry]) -> Stats {
    let total_stock = products.iter().map(|p| p.stock).sum();
    let total_value = products.iter().map(Product::value).sum();
    let low_stock = products
        .iter()
        .filter(|p| p.stock > 0 && p.stock < LOW_STOCK_THRESHOLD)
        .count();
    let out_of_stock = products.iter().filter(|p| p.stock == 0).count();

    Stats {
        total_products: products.len(),
        total_stock,
        total_value,
        low_stock,
        out_of_stock,
        recent_movements: newest_first(history, RECENT_MOVEMENTS),
    }
}

/// Up to `limit` entries, sorted by `fecha` descending (ties: higher id first).
pub fn newest_first(history: &[HistoryEntry], limit: usize) -> Vec<HistoryEntry> {
    let mut sorted: Vec<&HistoryEntry> = history.iter().collect();
    sorted.sort_by(|a, b| b.fecha.cmp(&a.fecha).then_with(|| b.id.cmp(&a.id)));
    sorted.into_iter().take(limit).cloned().collect()
}

/// Received vs. sent quantities across the whole history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovementTotals {
    pub received: i64,
    pub sent: i64,
    pub latest: Option<HistoryEntry>,
}

pub fn movement_totals(history: &[HistoryEntry]) -> MovementTotals {
    let mut totals = MovementTotals::default();
    for entry in history {
        match entry.tipo_movimiento {
            MovementKind::Entrada => totals.received += entry.cantidad,
            MovementKind::Salida => totals.sent += entry.cantidad,
        }
    }
    totals.latest = newest_first(history, 1).into_iter().next();
    totals
}

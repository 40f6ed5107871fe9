//! Product domain events and the writer that turns them into history rows.

use chrono::{DateTime, Utc};

use crate::error::{InventoryError, Result};
use crate::types::{HistoryEntry, MovementKind, Product};

/// Emitted by the gateway after a product mutation is applied locally.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductEvent {
    Created(Product),
    Updated { before: Product, after: Product },
    Deleted(Product),
}

impl ProductEvent {
    pub fn product_id(&self) -> i64 {
        match self {
            ProductEvent::Created(p) | ProductEvent::Deleted(p) => p.id,
            ProductEvent::Updated { after, .. } => after.id,
        }
    }
}

/// Appends one movement record per product event.
///
/// Creation is an `entrada` of the initial stock. Edits and deletions are
/// `salida`s: an edit records `before.stock - after.stock` (negative when stock
/// went up), a deletion records the stock that left with the product.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryWriter;

impl HistoryWriter {
    pub fn entry_for(&self, event: &ProductEvent, id: i64, fecha: DateTime<Utc>) -> HistoryEntry {
        let (kind, cantidad, note) = match event {
            ProductEvent::Created(p) => (
                MovementKind::Entrada,
                p.stock,
                format!("Producto creado: {}", p.nombre),
            ),
            ProductEvent::Updated { before, after } => (
                MovementKind::Salida,
                before.stock - after.stock,
                format!("Producto actualizado: {}", after.nombre),
            ),
            ProductEvent::Deleted(p) => (
                MovementKind::Salida,
                p.stock,
                format!("Producto eliminado: {}", p.nombre),
            ),
        };

        HistoryEntry {
            id,
            producto_id: event.product_id(),
            tipo_movimiento: kind,
            cantidad,
            fecha,
            observaciones: Some(note),
        }
    }

    /// Record `event` at the front of `history` (newest first).
    pub fn append(
        &self,
        event: &ProductEvent,
        history: &mut Vec<HistoryEntry>,
        now: DateTime<Utc>,
    ) -> Result<HistoryEntry> {
        let entry = self.entry_for(event, next_history_id(history)?, now);
        history.insert(0, entry.clone());
        Ok(entry)
    }
}

/// Local id for a new history row: one past the largest id seen.
pub fn next_history_id(history: &[HistoryEntry]) -> Result<i64> {
    let max = history.iter().map(|e| e.id).max().unwrap_or(0);
    max.checked_add(1)
        .ok_or_else(|| InventoryError::InvalidRow(format!("no history id after {max}")))
}

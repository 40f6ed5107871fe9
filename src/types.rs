//! Row types mirrored from the remote tables, plus the derived `Stats` record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

// ============================================================================
// Identity
// ============================================================================

/// Identity of the signed-in user. Snapshots are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Rows
// ============================================================================

/// A catalog product (`productos`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub nombre: String,
    pub categoria_id: i64,
    pub stock: i64,
    pub precio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

impl Product {
    pub fn new(
        id: i64,
        nombre: impl Into<String>,
        categoria_id: i64,
        stock: i64,
        precio: f64,
    ) -> Self {
        Self {
            id,
            nombre: nombre.into(),
            categoria_id,
            stock,
            precio,
            descripcion: None,
        }
    }

    /// Stock and price must both be non-negative.
    pub fn validate(&self) -> Result<()> {
        if self.stock < 0 {
            return Err(InventoryError::InvalidRow(format!(
                "product {} has negative stock {}",
                self.id, self.stock
            )));
        }
        if !(self.precio >= 0.0) {
            return Err(InventoryError::InvalidRow(format!(
                "product {} has invalid price {}",
                self.id, self.precio
            )));
        }
        Ok(())
    }

    /// Inventory value of this product (`precio * stock`).
    pub fn value(&self) -> f64 {
        self.precio * self.stock as f64
    }
}

/// A product category (`categorias`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub nombre: String,
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Entrada,
    Salida,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entrada => "entrada",
            MovementKind::Salida => "salida",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stock movement record (`historial`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub producto_id: i64,
    pub tipo_movimiento: MovementKind,
    pub cantidad: i64,
    pub fecha: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observaciones: Option<String>,
}

/// A history entry before the store assigns `id` and `fecha`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub producto_id: i64,
    pub tipo_movimiento: MovementKind,
    pub cantidad: i64,
    pub observaciones: Option<String>,
}

/// Derived dashboard figures. Always a pure function of products + history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_products: usize,
    pub total_stock: i64,
    pub total_value: f64,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub recent_movements: Vec<HistoryEntry>,
}

/// Rows that carry an integer primary key.
pub trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for Product {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for Category {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for HistoryEntry {
    fn key(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// Table names
// ============================================================================

/// Locally persisted snapshot tables. The key prefix matches the names the
/// browser build used, so `products-<user>` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Categories,
    History,
    Stats,
    Outbox,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Products,
        Table::Categories,
        Table::History,
        Table::Stats,
        Table::Outbox,
    ];

    pub fn key_prefix(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Categories => "categories",
            Table::History => "historial",
            Table::Stats => "stats",
            Table::Outbox => "outbox",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_prefix())
    }
}

/// Tables on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteTable {
    #[serde(rename = "productos")]
    Products,
    #[serde(rename = "categorias")]
    Categories,
    #[serde(rename = "historial")]
    History,
}

impl RemoteTable {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteTable::Products => "productos",
            RemoteTable::Categories => "categorias",
            RemoteTable::History => "historial",
        }
    }

    /// Snapshot table mirroring this remote table.
    pub fn local(&self) -> Table {
        match self {
            RemoteTable::Products => Table::Products,
            RemoteTable::Categories => Table::Categories,
            RemoteTable::History => Table::History,
        }
    }
}

impl fmt::Display for RemoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

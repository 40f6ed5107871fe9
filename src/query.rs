//! Read-side helpers over the in-memory tables.

use crate::stats::newest_first;
use crate::types::{Category, HistoryEntry, MovementKind, Product};

pub use crate::stats::{movement_totals, MovementTotals};

/// Shown for products whose `categoria_id` matches no category.
pub const UNCATEGORIZED: &str = "uncategorized";

pub fn category_name(categories: &[Category], id: i64) -> &str {
    categories
        .iter()
        .find(|c| c.id == id)
        .map_or(UNCATEGORIZED, |c| c.nombre.as_str())
}

/// Products whose name or category name contains `term` (case-insensitive),
/// sorted by name. An empty term matches everything.
pub fn search_products<'a>(
    products: &'a [Product],
    categories: &[Category],
    term: &str,
) -> Vec<&'a Product> {
    let term = term.trim().to_lowercase();
    let mut found: Vec<&Product> = products
        .iter()
        .filter(|p| {
            term.is_empty()
                || p.nombre.to_lowercase().contains(&term)
                || category_name(categories, p.categoria_id).to_lowercase().contains(&term)
        })
        .collect();
    found.sort_by_cached_key(|p| p.nombre.to_lowercase());
    found
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// `None` keeps both directions.
    pub kind: Option<MovementKind>,
    pub term: String,
}

impl HistoryFilter {
    pub fn kind(kind: MovementKind) -> Self {
        Self {
            kind: Some(kind),
            term: String::new(),
        }
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }
}

/// Movements matching `filter`, newest first.
///
/// The term is matched case-insensitively against the product name, the
/// movement kind, the observations and the quantity.
pub fn filter_history(
    history: &[HistoryEntry],
    products: &[Product],
    filter: &HistoryFilter,
) -> Vec<HistoryEntry> {
    let term = filter.term.trim().to_lowercase();
    let product_name = |id: i64| {
        products
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.nombre.to_lowercase())
            .unwrap_or_default()
    };

    let matching: Vec<HistoryEntry> = history
        .iter()
        .filter(|e| filter.kind.map_or(true, |kind| e.tipo_movimiento == kind))
        .filter(|e| {
            term.is_empty()
                || product_name(e.producto_id).contains(&term)
                || e.tipo_movimiento.as_str().contains(&term)
                || e.observaciones
                    .as_deref()
                    .is_some_and(|o| o.to_lowercase().contains(&term))
                || e.cantidad.to_string().contains(&term)
        })
        .cloned()
        .collect();

    let len = matching.len();
    newest_first(&matching, len)
}

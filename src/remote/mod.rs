//! Remote table store interface.
//!
//! The hosted database is an external collaborator: hosts implement
//! `RemoteStore` over their HTTP client. Rows cross this boundary as JSON
//! objects; decoding into typed rows happens in the sync layer.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::RemoteTable;

pub use memory::MemoryRemote;

// ============================================================================
// RemoteStore: user-provided table API
// ============================================================================

/// Per-table CRUD against the hosted store. No cross-table transactions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(
        &self,
        table: RemoteTable,
        query: &SelectQuery,
    ) -> Result<Vec<Value>, RemoteError>;

    /// Returns the rows as stored (with server-assigned fields filled in).
    async fn insert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError>;

    /// Merge `row`'s fields into every row matching `matcher`.
    async fn update(
        &self,
        table: RemoteTable,
        row: Value,
        matcher: &RowMatch,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, table: RemoteTable, matcher: &RowMatch) -> Result<(), RemoteError>;

    /// Insert or replace by `id`.
    async fn upsert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError>;
}

// ============================================================================
// Query types
// ============================================================================

/// Equality match on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMatch {
    pub column: String,
    pub value: Value,
}

impl RowMatch {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn id(id: i64) -> Self {
        Self::eq("id", id)
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// `select` parameters: optional filter and ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filter: Option<RowMatch>,
    pub order: Option<Order>,
}

impl SelectQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, matcher: RowMatch) -> Self {
        self.filter = Some(matcher);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }
}

// ============================================================================
// RemoteWrite: a single write, replayable from the outbox
// ============================================================================

/// The write operations the gateway issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteOp {
    Insert { rows: Vec<Value> },
    Update { row: Value, matcher: RowMatch },
    Delete { matcher: RowMatch },
    Upsert { rows: Vec<Value> },
}

impl RemoteOp {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOp::Insert { .. } => "insert",
            RemoteOp::Update { .. } => "update",
            RemoteOp::Delete { .. } => "delete",
            RemoteOp::Upsert { .. } => "upsert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWrite {
    pub table: RemoteTable,
    #[serde(flatten)]
    pub op: RemoteOp,
}

impl RemoteWrite {
    pub fn new(table: RemoteTable, op: RemoteOp) -> Self {
        Self { table, op }
    }

    pub async fn execute(&self, remote: &dyn RemoteStore) -> Result<(), RemoteError> {
        match &self.op {
            RemoteOp::Insert { rows } => remote.insert(self.table, rows.clone()).await.map(|_| ()),
            RemoteOp::Update { row, matcher } => {
                remote.update(self.table, row.clone(), matcher).await
            }
            RemoteOp::Delete { matcher } => remote.delete(self.table, matcher).await,
            RemoteOp::Upsert { rows } => remote.upsert(self.table, rows.clone()).await,
        }
    }
}

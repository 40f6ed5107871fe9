//! MemoryRemote: an in-process `RemoteStore` for tests and offline demos.
//!
//! Tables are plain `Vec<Value>`. Faults and latency can be injected per table
//! so callers can exercise fallback and supersede paths.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::RemoteTable;

use super::{RemoteStore, RowMatch, SelectQuery};

/// One successful write, as recorded by `MemoryRemote::writes`.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub table: RemoteTable,
    pub op: &'static str,
}

#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<RemoteTable, Vec<Value>>>,
    faults: Mutex<HashMap<RemoteTable, RemoteError>>,
    latency: Mutex<HashMap<RemoteTable, Duration>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a table's contents.
    pub fn seed(&self, table: RemoteTable, rows: Vec<Value>) {
        self.tables.lock().insert(table, rows);
    }

    pub fn rows(&self, table: RemoteTable) -> Vec<Value> {
        self.tables.lock().get(&table).cloned().unwrap_or_default()
    }

    /// Every call on `table` fails with `err` until `heal` is called.
    pub fn fail(&self, table: RemoteTable, err: RemoteError) {
        self.faults.lock().insert(table, err);
    }

    pub fn heal(&self, table: RemoteTable) {
        self.faults.lock().remove(&table);
    }

    pub fn heal_all(&self) {
        self.faults.lock().clear();
    }

    /// Delay every call on `table` by `delay`.
    pub fn set_latency(&self, table: RemoteTable, delay: Duration) {
        self.latency.lock().insert(table, delay);
    }

    /// Successful writes in the order they were applied.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    async fn enter(&self, table: RemoteTable) -> Result<(), RemoteError> {
        let delay = self.latency.lock().get(&table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.faults.lock().get(&table) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, table: RemoteTable, op: &'static str) {
        self.writes.lock().push(WriteRecord { table, op });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn next_id(rows: &[Value]) -> i64 {
    rows.iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        + 1
}

fn require_object(row: &Value) -> Result<(), RemoteError> {
    if row.is_object() {
        Ok(())
    } else {
        Err(RemoteError::rejected(format!("row must be an object, got {row}")))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn select(
        &self,
        table: RemoteTable,
        query: &SelectQuery,
    ) -> Result<Vec<Value>, RemoteError> {
        self.enter(table).await?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| query.filter.as_ref().map_or(true, |m| m.matches(row)))
            .collect();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        table: RemoteTable,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, RemoteError> {
        self.enter(table).await?;
        rows.iter().try_for_each(require_object)?;

        let mut tables = self.tables.lock();
        let existing = tables.entry(table).or_default();
        let mut inserted = Vec::with_capacity(rows.len());
        for mut row in rows {
            match row.get("id").and_then(Value::as_i64) {
                Some(id) if existing.iter().any(|r| RowMatch::id(id).matches(r)) => {
                    return Err(RemoteError::rejected(format!(
                        "duplicate key value violates unique constraint: {table}.id={id}"
                    )));
                }
                Some(_) => {}
                None => {
                    let id = next_id(existing);
                    if let Some(obj) = row.as_object_mut() {
                        obj.insert("id".to_string(), Value::from(id));
                    }
                }
            }
            existing.push(row.clone());
            inserted.push(row);
        }
        drop(tables);

        self.record(table, "insert");
        Ok(inserted)
    }

    async fn update(
        &self,
        table: RemoteTable,
        row: Value,
        matcher: &RowMatch,
    ) -> Result<(), RemoteError> {
        self.enter(table).await?;
        let Value::Object(fields) = row else {
            return Err(RemoteError::rejected("update payload must be an object"));
        };

        let mut tables = self.tables.lock();
        for existing in tables.entry(table).or_default().iter_mut() {
            if !matcher.matches(existing) {
                continue;
            }
            if let Some(obj) = existing.as_object_mut() {
                for (k, v) in &fields {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        drop(tables);

        self.record(table, "update");
        Ok(())
    }

    async fn delete(&self, table: RemoteTable, matcher: &RowMatch) -> Result<(), RemoteError> {
        self.enter(table).await?;
        self.tables
            .lock()
            .entry(table)
            .or_default()
            .retain(|row| !matcher.matches(row));
        self.record(table, "delete");
        Ok(())
    }

    async fn upsert(&self, table: RemoteTable, rows: Vec<Value>) -> Result<(), RemoteError> {
        self.enter(table).await?;
        rows.iter().try_for_each(require_object)?;

        let mut tables = self.tables.lock();
        let existing = tables.entry(table).or_default();
        for row in rows {
            let slot = row
                .get("id")
                .and_then(Value::as_i64)
                .and_then(|id| existing.iter().position(|r| RowMatch::id(id).matches(r)));
            match slot {
                Some(i) => existing[i] = row,
                None => existing.push(row),
            }
        }
        drop(tables);

        self.record(table, "upsert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn select_filters_and_orders() {
        let remote = MemoryRemote::new();
        remote.seed(
            RemoteTable::History,
            vec![
                json!({"id": 1, "producto_id": 1, "fecha": "2024-01-01T00:00:00Z"}),
                json!({"id": 2, "producto_id": 2, "fecha": "2024-03-01T00:00:00Z"}),
                json!({"id": 3, "producto_id": 1, "fecha": "2024-02-01T00:00:00Z"}),
            ],
        );

        let rows = remote
            .select(RemoteTable::History, &SelectQuery::all().order_by("fecha", false))
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let rows = remote
            .select(
                RemoteTable::History,
                &SelectQuery::all().filter(RowMatch::eq("producto_id", 1)).order_by("id", true),
            )
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_rejects_duplicates() {
        let remote = MemoryRemote::new();
        let inserted = remote
            .insert(RemoteTable::Categories, vec![json!({"nombre": "A"}), json!({"nombre": "B"})])
            .await
            .unwrap();
        assert_eq!(inserted[0]["id"], json!(1));
        assert_eq!(inserted[1]["id"], json!(2));

        let err = remote
            .insert(RemoteTable::Categories, vec![json!({"id": 1, "nombre": "C"})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::RemoteErrorKind::Rejected);
    }

    #[tokio::test]
    async fn update_delete_upsert() {
        let remote = MemoryRemote::new();
        remote.seed(RemoteTable::Products, vec![json!({"id": 1, "stock": 5})]);

        remote
            .update(RemoteTable::Products, json!({"stock": 7}), &RowMatch::id(1))
            .await
            .unwrap();
        assert_eq!(remote.rows(RemoteTable::Products)[0]["stock"], json!(7));

        remote
            .upsert(
                RemoteTable::Products,
                vec![json!({"id": 1, "stock": 1}), json!({"id": 2, "stock": 2})],
            )
            .await
            .unwrap();
        assert_eq!(remote.rows(RemoteTable::Products).len(), 2);
        assert_eq!(remote.rows(RemoteTable::Products)[0]["stock"], json!(1));

        remote.delete(RemoteTable::Products, &RowMatch::id(1)).await.unwrap();
        assert_eq!(remote.rows(RemoteTable::Products), vec![json!({"id": 2, "stock": 2})]);

        let ops: Vec<&str> = remote.writes().iter().map(|w| w.op).collect();
        assert_eq!(ops, vec!["update", "upsert", "delete"]);
    }

    #[tokio::test]
    async fn injected_faults() {
        let remote = MemoryRemote::new();
        remote.fail(RemoteTable::Products, RemoteError::unavailable("offline"));
        assert!(remote.select(RemoteTable::Products, &SelectQuery::all()).await.is_err());
        assert!(remote.select(RemoteTable::Categories, &SelectQuery::all()).await.is_ok());

        remote.heal(RemoteTable::Products);
        assert!(remote.select(RemoteTable::Products, &SelectQuery::all()).await.is_ok());
        assert!(remote.writes().is_empty());
    }
}

//! Local Snapshot Store: per-user, per-table mirror of the last known rows.
//!
//! Each `(user, table)` pair is one key in the underlying `KeyValueStore`
//! (`products-<user>`, `historial-<user>`, ...). Values are JSON envelopes
//! carrying the owner, table, rows, and save time. Tables are written
//! independently; there is no cross-table atomicity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{InventoryError, Result};
use crate::types::{Stats, Table, UserId};

use super::traits::KeyValueStore;

/// Key holding the id of the last signed-in user.
pub const CURRENT_USER_KEY: &str = "currentUserId";

/// Serialized form of one table snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    pub user_id: UserId,
    pub table: String,
    pub rows: Vec<T>,
    pub saved_at: DateTime<Utc>,
}

/// Typed view over a `KeyValueStore` holding table snapshots.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn key(user: &UserId, table: Table) -> String {
        format!("{}-{}", table.key_prefix(), user)
    }

    /// Persist `rows` for `(user, table)`, replacing any previous snapshot.
    pub fn save<T: Serialize>(&self, user: &UserId, table: Table, rows: &[T]) -> Result<()> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SnapshotRef<'a, T> {
            user_id: &'a UserId,
            table: &'a str,
            rows: &'a [T],
            saved_at: DateTime<Utc>,
        }

        let key = Self::key(user, table);
        let body = serde_json::to_string(&SnapshotRef {
            user_id: user,
            table: table.key_prefix(),
            rows,
            saved_at: Utc::now(),
        })?;
        self.backend.set(&key, &body)?;
        debug!(%key, rows = rows.len(), "snapshot saved");
        Ok(())
    }

    /// Full snapshot for `(user, table)`, or `None` if nothing usable is stored.
    ///
    /// A value that fails to parse, or that belongs to a different user, is
    /// treated as absent and logged as `CacheCorrupt`.
    pub fn load_snapshot<T: DeserializeOwned>(
        &self,
        user: &UserId,
        table: Table,
    ) -> Result<Option<Snapshot<T>>> {
        let key = Self::key(user, table);
        let Some(raw) = self.backend.get(&key)? else {
            return Ok(None);
        };

        let parsed = serde_json::from_str::<Snapshot<T>>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|snapshot| {
                if &snapshot.user_id == user {
                    Ok(snapshot)
                } else {
                    Err(format!("owned by user {}", snapshot.user_id))
                }
            });

        match parsed {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(message) => {
                let err = InventoryError::CacheCorrupt { key, message };
                warn!(error = %err, "discarding unreadable snapshot");
                Ok(None)
            }
        }
    }

    /// Rows for `(user, table)`; empty when missing or corrupt.
    pub fn load<T: DeserializeOwned>(&self, user: &UserId, table: Table) -> Result<Vec<T>> {
        Ok(self
            .load_snapshot(user, table)?
            .map(|snapshot| snapshot.rows)
            .unwrap_or_default())
    }

    pub fn save_stats(&self, user: &UserId, stats: &Stats) -> Result<()> {
        self.save(user, Table::Stats, std::slice::from_ref(stats))
    }

    pub fn load_stats(&self, user: &UserId) -> Result<Option<Stats>> {
        Ok(self.load::<Stats>(user, Table::Stats)?.into_iter().next())
    }

    /// Remove every table snapshot for `user`, and forget them as the last user.
    pub fn clear(&self, user: &UserId) -> Result<()> {
        for table in Table::ALL {
            self.backend.remove(&Self::key(user, table))?;
        }
        if self.last_user()?.as_ref() == Some(user) {
            self.backend.remove(CURRENT_USER_KEY)?;
        }
        debug!(%user, "snapshots cleared");
        Ok(())
    }

    pub fn remember_user(&self, user: &UserId) -> Result<()> {
        self.backend.set(CURRENT_USER_KEY, user.as_str())
    }

    pub fn last_user(&self) -> Result<Option<UserId>> {
        Ok(self
            .backend
            .get(CURRENT_USER_KEY)?
            .filter(|id| !id.is_empty())
            .map(UserId::new))
    }
}

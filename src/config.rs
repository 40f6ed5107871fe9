//! Session configuration.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{InventoryError, Result};
use crate::storage::{KeyValueStore, MemoryStore};

/// What to do with remote writes that cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// At most once: offline writes skip the remote, failed writes are
    /// reported and later overwritten by the next full sync.
    #[default]
    WriteBehind,
    /// Offline and unreachable writes are queued per user and replayed before
    /// the next sync cycle fetches.
    Outbox,
}

/// Options for `InventorySession`.
///
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// SQLite file for snapshots. `None` keeps snapshots in memory.
    pub snapshot_path: Option<PathBuf>,
    /// Connectivity assumed until the host reports otherwise (default: true)
    pub initially_online: bool,
    pub write_policy: WritePolicy,
    /// Max queued writes under `WritePolicy::Outbox` (default: 1000)
    pub outbox_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            initially_online: true,
            write_policy: WritePolicy::default(),
            outbox_limit: 1000,
        }
    }
}

impl SessionOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Open the key-value store the options describe.
    pub fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        match &self.snapshot_path {
            None => Ok(Arc::new(MemoryStore::new())),
            #[cfg(feature = "sqlite")]
            Some(path) => Ok(Arc::new(crate::storage::SqliteStore::open(path)?)),
            #[cfg(not(feature = "sqlite"))]
            Some(path) => Err(InventoryError::Storage(format!(
                "snapshot_path {} requires the `sqlite` feature",
                path.display()
            ))),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.write_policy == WritePolicy::Outbox && self.outbox_limit == 0 {
            return Err(InventoryError::Storage(
                "outbox_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

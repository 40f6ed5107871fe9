//! MemoryStore: a `KeyValueStore` that lives only as long as the process.
//!
//! Used for tests and for hosts without a writable data directory.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;

use super::traits::KeyValueStore;

/// In-memory key-value store.
///
/// Interior mutability via `parking_lot::Mutex`, so it is `Send + Sync` and can
/// sit behind an `Arc<dyn KeyValueStore>`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sorted list of keys, for inspection in tests.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

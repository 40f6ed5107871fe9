//! Local persistence interface.

use crate::error::Result;

/// String-keyed durable key-value store scoped to the device.
///
/// All methods are synchronous and take `&self`; implementations use interior
/// mutability so a store can be shared as `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites any previous value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

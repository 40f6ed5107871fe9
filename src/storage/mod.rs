pub mod memory;
pub mod snapshot;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use snapshot::{Snapshot, SnapshotStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::KeyValueStore;

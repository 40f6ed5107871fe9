//! Local-first inventory cache.
//!
//! Mirrors the `productos`, `categorias` and `historial` tables of a hosted
//! store into per-user local snapshots, serves them while offline, and applies
//! mutations locally before writing them through.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod gateway;
pub mod query;
pub mod remote;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod types;

pub use auth::{AuthProvider, StaticAuth};
pub use config::{SessionOptions, WritePolicy};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityWatcher};
pub use error::{InventoryError, RemoteError, RemoteErrorKind, Result};
pub use events::{HistoryWriter, ProductEvent};
pub use gateway::{Mutation, MutationGateway, MutationReport, RemoteStatus, TableOp};
pub use remote::{MemoryRemote, RemoteOp, RemoteStore, RemoteWrite, RowMatch, SelectQuery};
pub use session::{InventorySession, InventoryView};
pub use stats::{compute_stats, LOW_STOCK_THRESHOLD, RECENT_MOVEMENTS};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use storage::{KeyValueStore, MemoryStore, SnapshotStore};
pub use sync::{
    LocalWrites, Outbox, ReplayReport, SyncCoordinator, SyncCounts, SyncOutcome, SyncPhase,
};
pub use types::{
    Category, HistoryEntry, MovementKind, NewHistoryEntry, Product, RemoteTable, Stats, Table,
    UserId,
};

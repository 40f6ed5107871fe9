pub mod coordinator;
pub mod outbox;
pub mod types;
pub mod writes;

pub use coordinator::SyncCoordinator;
pub use outbox::{Outbox, ReplayReport};
pub use types::{SyncCounts, SyncOutcome, SyncPhase};
pub use writes::{LocalWrites, WriteGuard};

//! Sync-specific types: coordinator phases and cycle outcomes.

use crate::error::InventoryError;

// ============================================================================
// SyncPhase: coordinator state machine
// ============================================================================

/// Coordinator state.
///
/// `Idle → Syncing → {Synced, SyncFailed}`; a `became-offline` event moves any
/// state to `ServingFromCache`, and logout returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Synced,
    /// Last cycle failed; memory holds the last local snapshot.
    SyncFailed,
    /// Offline; reads come from the local snapshot.
    ServingFromCache,
}

impl SyncPhase {
    /// True when the UI should show the offline/stale-data banner.
    pub fn is_stale(&self) -> bool {
        matches!(self, SyncPhase::SyncFailed | SyncPhase::ServingFromCache)
    }
}

// ============================================================================
// Sync Result Types
// ============================================================================

/// Row counts committed by a successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub products: usize,
    pub categories: usize,
    pub history: usize,
    /// Outbox writes delivered before the fetch.
    pub replayed: usize,
}

/// Result of one sync cycle, or of switching to cache-only mode.
#[derive(Debug)]
pub enum SyncOutcome {
    Synced(SyncCounts),
    /// A fetch failed. Memory was reloaded from the local snapshot.
    Failed { error: InventoryError },
    /// A newer cycle, an offline transition, or a logout overtook this one.
    /// Nothing was committed.
    Superseded,
    /// Offline: no fetch attempted, memory serves the local snapshot.
    FromCache,
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced(_))
    }

    pub fn error(&self) -> Option<&InventoryError> {
        match self {
            SyncOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

use thiserror::Error;

use crate::types::RemoteTable;

/// Crate-wide error type.
///
/// Remote failures are downgraded at the coordinator/gateway boundary: a sync
/// turns them into a cache fallback and a mutation reports them without undoing
/// the local write. Only local failures and `NoUser` reach callers as `Err`.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote store rejected {table}: {message}")]
    RemoteRejected { table: String, message: String },

    #[error("cached snapshot {key} is corrupt: {message}")]
    CacheCorrupt { key: String, message: String },

    #[error("no user is signed in")]
    NoUser,

    #[error("{table} row {id} not found")]
    NotFound { table: String, id: i64 },

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InventoryError {
    /// True for failures that mean "could not reach the remote" as opposed to
    /// "the remote refused".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, InventoryError::RemoteUnavailable(_))
    }

    pub(crate) fn from_remote(table: RemoteTable, err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::Unavailable => InventoryError::RemoteUnavailable(err.message),
            RemoteErrorKind::Rejected | RemoteErrorKind::Auth => InventoryError::RemoteRejected {
                table: table.to_string(),
                message: err.message,
            },
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for InventoryError {
    fn from(e: rusqlite::Error) -> Self {
        InventoryError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;

// ============================================================================
// RemoteError: transport-level failures from the remote store / auth provider
// ============================================================================

/// Classification of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network failure, timeout, service down.
    Unavailable,
    /// Validation or constraint error from the table store.
    Rejected,
    /// Session expired or credentials refused.
    Auth,
}

/// Error returned by `RemoteStore` and `AuthProvider` implementations.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub message: String,
    pub kind: RemoteErrorKind,
}

impl RemoteError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: RemoteErrorKind::Unavailable,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: RemoteErrorKind::Rejected,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: RemoteErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RemoteError {}

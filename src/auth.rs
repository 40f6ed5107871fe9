//! Auth provider interface. Only used to learn which user owns the snapshots.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::RemoteError;
use crate::types::UserId;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, or `None` when there is no session.
    async fn current_user(&self) -> Result<Option<UserId>, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// Auth provider with a fixed, externally controlled session.
#[derive(Default)]
pub struct StaticAuth {
    user: Mutex<Option<UserId>>,
}

impl StaticAuth {
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: Mutex::new(Some(user.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *self.user.lock() = Some(user.into());
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Result<Option<UserId>, RemoteError> {
        Ok(self.user.lock().clone())
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.user.lock().take();
        Ok(())
    }
}

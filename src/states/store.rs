//! State store trait.

use async_trait::async_trait;

use crate::error::Result;

use super::lock::LockInfo;
use super::state::State;

/// Persistent storage for [`State`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state. Returns `None` if nothing has been written yet.
    async fn load(&self) -> Result<Option<State>>;

    /// Persists the state.
    async fn save(&self, state: &State) -> Result<()>;

    /// Acquires the state lock for an operation.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of holder.
    async fn force_unlock(&self) -> Result<()>;

    /// Current lock, if held and not expired.
    async fn lock_info(&self) -> Result<Option<LockInfo>>;

    /// Backend name for display.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<State>> {
        (**self).load().await
    }

    async fn save(&self, state: &State) -> Result<()> {
        (**self).save(state).await
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder, operation).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn force_unlock(&self) -> Result<()> {
        (**self).force_unlock().await
    }

    async fn lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).lock_info().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}

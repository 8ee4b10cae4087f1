//! File-backed state store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::state::State;
use super::store::StateStore;

/// Default state file name.
pub const DEFAULT_STATE_FILE: &str = "graphform.state.json";

/// Stores state as pretty JSON on the local filesystem.
///
/// Writes go to a temporary file that is renamed over the state file. The
/// lock is a sibling `.lock` file holding a [`LockInfo`].
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store for the given state file.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let mut lock_name = state_path.file_name().map_or_else(
            || DEFAULT_STATE_FILE.into(),
            std::ffi::OsStr::to_os_string,
        );
        lock_name.push(".lock");
        let lock_path = state_path.with_file_name(lock_name);
        Self {
            state_path,
            lock_path,
        }
    }

    /// Creates a store using [`DEFAULT_STATE_FILE`] inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_STATE_FILE))
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating state directory: {}", parent.display());
                fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::State(StateError::WriteFailed {
                        message: format!("Failed to create state directory: {e}"),
                    })
                })?;
            }
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            EngineError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;
        let lock = serde_json::from_str(&content).map_err(|e| {
            EngineError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;
        Ok(Some(lock))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let write_failed = |e: std::io::Error| {
            EngineError::State(StateError::WriteFailed {
                message: format!("{}: {e}", path.display()),
            })
        };
        let mut file = fs::File::create(path).await.map_err(write_failed)?;
        file.write_all(content.as_bytes()).await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<State>> {
        if !self.state_path.exists() {
            debug!("No state file at {}", self.state_path.display());
            return Ok(None);
        }
        info!("Loading state from {}", self.state_path.display());
        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            EngineError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;
        let state = serde_json::from_str(&content).map_err(|e| {
            EngineError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &State) -> Result<()> {
        self.ensure_parent().await?;
        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.state_path.with_extension("tmp");
        self.write_file(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.state_path).await.map_err(|e| {
            EngineError::State(StateError::WriteFailed {
                message: format!("Failed to replace state file: {e}"),
            })
        })?;
        info!(
            "Saved state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(EngineError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            warn!("Taking over expired lock held by {}", existing.holder);
        }

        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let lock = LockInfo::new(&holder, operation);
        self.ensure_parent().await?;
        let content = serde_json::to_string_pretty(&lock)?;
        self.write_file(&self.lock_path, &content).await?;
        info!(
            "Acquired state lock {} for {operation} (expires in {LOCK_EXPIRY_SECS}s)",
            lock.lock_id
        );
        Ok(lock)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.force_unlock().await?;
                info!("Released state lock {lock_id}");
            }
            Some(existing) => {
                debug!(
                    "Not releasing lock: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
            None => {}
        }
        Ok(())
    }

    async fn force_unlock(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                EngineError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }

    async fn lock_info(&self) -> Result<Option<LockInfo>> {
        Ok(self.read_lock_file().await?.filter(|lock| !lock.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{AbsProviderConfig, AbsResourceInstance, ModulePath, Provider};
    use crate::states::ResourceInstanceObject;
    use crate::value::Value;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::in_dir(temp_dir.path().join("nested"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("load").is_none());

        let mut state = State::new();
        let addr: AbsResourceInstance = "test_instance.a".parse().expect("addr");
        let provider = AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), None);
        state.set_current(
            &addr,
            Some(ResourceInstanceObject::new(Value::map([("ami", Value::from("bar"))]))),
            &provider,
        );
        state.touch();
        store.save(&state).await.expect("save");

        let loaded = store.load().await.expect("load").expect("state exists");
        assert_eq!(loaded, state);
        assert!(!store.state_path().with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_state_loads_as_none() {
        let (store, _temp) = create_test_store();
        let loaded = tokio_test::assert_ok!(tokio_test::block_on(store.load()));
        assert!(loaded.is_none());
        assert!(!store.state_path().exists());
    }

    #[tokio::test]
    async fn test_corrupted_state() {
        let (store, _temp) = create_test_store();
        store.ensure_parent().await.expect("dir");
        fs::write(store.state_path(), "{ not json").await.expect("write");
        let err = store.load().await.expect_err("corrupted");
        assert!(matches!(err, EngineError::State(StateError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();
        let lock = store.acquire_lock("holder-1", "apply").await.expect("lock");
        assert_eq!(store.lock_info().await.expect("info").map(|l| l.holder), Some("holder-1".to_string()));

        let err = store.acquire_lock("holder-2", "plan").await.expect_err("conflict");
        assert!(err.is_retryable());

        store.release_lock("someone-else").await.expect("noop release");
        assert!(store.lock_info().await.expect("info").is_some());

        store.release_lock(&lock.lock_id).await.expect("release");
        assert!(store.lock_info().await.expect("info").is_none());
    }

    #[tokio::test]
    async fn test_force_unlock() {
        let (store, _temp) = create_test_store();
        store.acquire_lock("", "plan").await.expect("lock");
        store.force_unlock().await.expect("unlock");
        store.acquire_lock("other", "plan").await.expect("relock");
    }
}

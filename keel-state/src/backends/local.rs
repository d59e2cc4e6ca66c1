//! Local file backend
//!
//! State lives in a JSON file (default `keel.state.json`) next to a `.lock`
//! file holding the current [`LockInfo`]. Writes go through a temporary file
//! and a rename so an interrupted apply never leaves a truncated state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keel_core::parser::BackendConfig;
use keel_core::resource::Value;
use tokio::fs;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "keel.state.json";

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    /// `backend local { path = "..." }`
    pub fn from_config(config: &BackendConfig) -> Self {
        let path = config
            .attributes
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(Self::DEFAULT_STATE_FILE);
        Self::with_path(path)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::with_path(Self::DEFAULT_STATE_FILE)
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };
        let state = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse state file: {}", e)))?;
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            if stored.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: stored.lineage,
                    actual: state.lineage.clone(),
                });
            }
            if stored.serial > state.serial {
                return Err(BackendError::StaleSerial {
                    stored: stored.serial,
                    attempted: state.serial,
                });
            }
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize state: {}", e)))?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        log::debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            log::warn!("taking over expired lock {} held by {}", existing.id, existing.who);
        }

        let lock = LockInfo::new(operation);
        let content = serde_json::to_string_pretty(&lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;
        fs::write(&self.lock_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;
        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;
        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn read_write_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.lineage, state.lineage);
    }

    #[tokio::test]
    async fn foreign_lineage_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        backend.write_state(&StateFile::new()).await.unwrap();

        let result = backend.write_state(&StateFile::new()).await;
        assert!(matches!(result, Err(BackendError::LineageMismatch { .. })));
    }

    #[tokio::test]
    async fn older_serial_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let mut state = StateFile::new();
        let stale = state.clone();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let result = backend.write_state(&stale).await;
        assert!(matches!(
            result,
            Err(BackendError::StaleSerial {
                stored: 1,
                attempted: 0
            })
        ));
    }

    #[tokio::test]
    async fn locking() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert!(matches!(
            backend.acquire_lock("destroy").await,
            Err(BackendError::Locked { .. })
        ));

        let other = LockInfo::new("apply");
        assert!(matches!(
            backend.release_lock(&other).await,
            Err(BackendError::LockMismatch { .. })
        ));

        backend.release_lock(&lock).await.unwrap();
        let lock = backend.acquire_lock("destroy").await.unwrap();
        backend.force_unlock(&lock.id).await.unwrap();
        assert!(matches!(
            backend.force_unlock(&lock.id).await,
            Err(BackendError::LockNotFound(_))
        ));
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("test.state.json"));
        let stale = LockInfo::with_timeout("apply", chrono::Duration::seconds(-1));
        std::fs::write(
            dir.path().join("test.state.lock"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[test]
    fn path_from_config() {
        let default = BackendConfig {
            backend_type: "local".to_string(),
            attributes: HashMap::new(),
        };
        assert_eq!(
            LocalBackend::from_config(&default).state_path(),
            Path::new("keel.state.json")
        );

        let custom = BackendConfig {
            backend_type: "local".to_string(),
            attributes: HashMap::from([(
                "path".to_string(),
                Value::String("envs/prod.json".to_string()),
            )]),
        };
        assert_eq!(
            LocalBackend::from_config(&custom).state_path(),
            Path::new("envs/prod.json")
        );
    }
}

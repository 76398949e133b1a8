//! Persisted handle state
//!
//! Manages `.tierflow/state.json`, which records the handles of everything
//! already created so that a later `apply` can resume instead of
//! recreating.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tierflow_core::{Handle, HandleSet, ProvisioningPlan};
use tokio::fs;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".tierflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Handles of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Stack name the handles belong to
    pub stack: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub handles: HandleSet,
}

impl StackState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack: stack.into(),
            updated_at: Utc::now(),
            handles: HandleSet::new(),
        }
    }

    pub fn set_handle(&mut self, handle: Handle) {
        self.handles.insert(handle);
        self.updated_at = Utc::now();
    }

    /// Forget handles of ids the plan no longer declares; returns their ids
    pub fn prune(&mut self, plan: &ProvisioningPlan) -> Vec<String> {
        let dropped = self.handles.retain(|id| plan.position(id).is_some());
        if !dropped.is_empty() {
            self.updated_at = Utc::now();
        }
        dropped
    }

    pub fn replace_handles(&mut self, handles: HandleSet) {
        self.handles = handles;
        self.updated_at = Utc::now();
    }
}

/// Reads and writes state files under a project directory
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load state for `stack`; missing file means nothing was created yet
    pub async fn load(&self, stack: &str) -> Result<StackState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StackState::new(stack));
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::State(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.stack != stack {
            return Err(CloudError::State(format!(
                "State file belongs to stack '{}', not '{}'",
                state.stack, stack
            )));
        }

        tracing::debug!("Loaded state with {} handles", state.handles.len());
        Ok(state)
    }

    /// Write state, keeping the previous file as a backup
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} handles", state.handles.len());
        Ok(())
    }

    /// Acquire the lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < STALE_LOCK_HOURS {
                return Err(CloudError::Lock(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        fs::write(&lock_path, serde_json::to_string_pretty(&lock_info)?).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StackState::new("custody");
        state.set_handle(Handle::new("bastion", "i-0001").with_attribute("public_ip", "203.0.113.10"));
        manager.save(&state).await.unwrap();

        let loaded = manager.load("custody").await.unwrap();
        assert_eq!(loaded.handles.len(), 1);
        assert_eq!(
            loaded.handles.get("bastion").and_then(|h| h.attribute("public_ip")),
            Some("203.0.113.10")
        );
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load("custody").await.unwrap();
        assert!(state.handles.is_empty());
        assert_eq!(state.stack, "custody");
    }

    #[tokio::test]
    async fn test_second_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StackState::new("custody");
        manager.save(&state).await.unwrap();
        state.set_handle(Handle::new("pub", "sg-0001"));
        manager.save(&state).await.unwrap();

        assert!(manager.backup_path().exists());
        let backup: StackState =
            serde_json::from_str(&std::fs::read_to_string(manager.backup_path()).unwrap()).unwrap();
        assert!(backup.handles.is_empty());
    }

    #[test]
    fn test_prune_drops_undeclared_handles() {
        let topology = tierflow_core::load_topology_str(
            r#"access-group "pub" tier="public" {
    ingress "tcp" 22 from="0.0.0.0/0"
}"#,
            "custody",
        )
        .unwrap();
        let plan = tierflow_core::synthesize(&topology).unwrap();

        let mut state = StackState::new("custody");
        state.set_handle(Handle::new("pub", "sg-0001"));
        state.set_handle(Handle::new("server", "i-0002"));

        assert_eq!(state.prune(&plan), vec!["server"]);
        assert!(state.handles.contains("pub"));
        assert!(!state.handles.contains("server"));
    }

    #[tokio::test]
    async fn test_state_of_other_stack_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&StackState::new("custody")).await.unwrap();

        assert!(matches!(
            manager.load("staging").await,
            Err(CloudError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let mut state = StackState::new("custody");
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load("custody").await,
            Err(CloudError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::Lock(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.lock_path().exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.ensure_state_dir().await.unwrap();

        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(manager.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        assert!(manager.acquire_lock().await.is_ok());
    }
}

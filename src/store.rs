//! Checkpoint store.
//!
//! Durable keyed storage for [`TaskState`]. Writes are whole-record
//! replacements; there are no partial-field updates. Only one invocation
//! should ever hold `running` status for a task, so last-writer-wins is
//! acceptable.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::state::TaskState;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a task, if one exists.
    async fn get(&self, task_id: &str) -> Result<Option<TaskState>>;

    /// Persist a full task snapshot, replacing any previous record.
    async fn put(&self, state: &TaskState) -> Result<()>;

    /// All persisted task states. Used by the watchdog scan and listings.
    async fn list(&self) -> Result<Vec<TaskState>>;
}

/// File-backed store: one JSON document per task under a directory.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| StoreError::Storage {
                path: dir.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(Self { dir })
    }

    /// Store under the user's home directory (`~/.longhaul/tasks`).
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".longhaul").join("tasks"))
    }

    fn path_for(&self, task_id: &str) -> Result<PathBuf, StoreError> {
        // Task ids become file names; reject anything that could leave
        // the store directory.
        let valid = !task_id.is_empty()
            && task_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidTaskId {
                task_id: task_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", task_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, task_id: &str) -> Result<Option<TaskState>> {
        let path = self.path_for(task_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Load {
                    task_id: task_id.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
        };
        let state = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            task_id: task_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(state))
    }

    async fn put(&self, state: &TaskState) -> Result<()> {
        let path = self.path_for(&state.task_id)?;
        let json = serde_json::to_string_pretty(state).map_err(|e| StoreError::Save {
            task_id: state.task_id.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| StoreError::Save {
            task_id: state.task_id.clone(),
            message: e.to_string(),
        })?;
        debug!(task_id = %state.task_id, status = %state.status, "checkpoint saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskState>> {
        let mut states = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::Storage {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(?path, error = %e, "skipping unreadable checkpoint");
                    continue;
                }
            };
            match serde_json::from_str::<TaskState>(&content) {
                Ok(state) => states.push(state),
                Err(e) => warn!(?path, error = %e, "skipping corrupt checkpoint"),
            }
        }
        states.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(states)
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    tasks: RwLock<HashMap<String, TaskState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, task_id: &str) -> Result<Option<TaskState>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn put(&self, state: &TaskState) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert(state.task_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskState>> {
        let mut states: Vec<TaskState> = self.tasks.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(states)
    }
}

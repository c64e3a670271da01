//! Common types and utilities shared between fleetstor-api and its consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to the hardware pool (cluster of compute nodes) a storage pool is attached to.
///
/// The hardware pool itself lives in another subsystem; this is only its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwarePoolId(pub String);

impl HardwarePoolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HardwarePoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discrete allocation of capacity carved out of a storage pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub id: String,
    pub storage_pool_id: String,
    pub name: String,
    pub lun: Option<u32>,   // backend-specific, opaque to the pool model
    pub size_in_gb: u64,
    pub created_at: DateTime<Utc>,
}

/// Administrative operation recorded against a storage pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Create,
    Resize,
    Delete,
    Attach,
    Refresh,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Resize => "resize",
            Self::Delete => "delete",
            Self::Attach => "attach",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "resize" => Ok(Self::Resize),
            "delete" => Ok(Self::Delete),
            "attach" => Ok(Self::Attach),
            "refresh" => Ok(Self::Refresh),
            other => Err(Error::Validation(format!("Unknown task action: {}", other))),
        }
    }
}

/// Execution state of a storage task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Queued,
    Running,
    Finished,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether the task-execution engine is done with this task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(Error::Validation(format!("Unknown task state: {}", other))),
        }
    }
}

/// Record of an administrative operation against a storage pool.
///
/// Tasks reference their pool by id only and survive the pool's deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTask {
    pub id: String,
    pub storage_pool_id: String,
    pub action: TaskAction,
    pub state: TaskState,
    pub args: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_ended: Option<DateTime<Utc>>,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Storage pool error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported storage type: {0}")]
    UnsupportedStorageType(String),

    #[error("Storage pool not found: {0}")]
    StoragePoolNotFound(String),

    #[error("Storage volume not found: {0}")]
    StorageVolumeNotFound(String),

    #[error("Storage task not found: {0}")]
    StorageTaskNotFound(String),

    #[error("Storage pool has not been saved yet")]
    UnsavedStoragePool,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend registry error: {0}")]
    Registry(String),

    #[error("Failed to delete storage pool {pool_id}: {reason}")]
    CascadeDeletion { pool_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
    }

    #[test]
    fn test_task_action_parse() {
        assert_eq!("resize".parse::<TaskAction>().unwrap(), TaskAction::Resize);
        assert_eq!(TaskAction::Attach.to_string(), "attach");
        assert!("explode".parse::<TaskAction>().is_err());
    }

    #[test]
    fn test_task_state_serde_matches_display() {
        let json = serde_json::to_string(&TaskState::Canceled).unwrap();
        assert_eq!(json, format!("\"{}\"", TaskState::Canceled));
    }

    #[test]
    fn test_unsupported_storage_type_message() {
        let err = Error::UnsupportedStorageType("NFS".to_string());
        assert_eq!(err.to_string(), "Unsupported storage type: NFS");
    }
}

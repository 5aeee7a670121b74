use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::publish::ProcessingDescriptor;
use super::errors::Result;
use super::task::UploadTask;

/// Task identity, fixed at creation and stable across retries. Doubles as
/// the stem of the storage object key, so a retried upload addresses the
/// same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Uploading,
    Processing,
    Completed,
    Error,
}

impl TaskState {
    /// Total transition check. Anything not listed is illegal and gets
    /// rejected instead of silently applied. `Error -> Uploading` is the
    /// retry edge; `Completed` has no successors.
    pub fn can_transition(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Uploading, Processing)
                | (Uploading, Error)
                | (Processing, Completed)
                | (Processing, Error)
                | (Error, Uploading)
        )
    }
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Added {
        task_id: TaskId,
    },

    StateChanged {
        task_id: TaskId,
        old_state: TaskState,
        new_state: TaskState,
    },

    Progress {
        task_id: TaskId,
        transferred: u64,
        total: u64,
        percent: u8,
    },

    Completed {
        task_id: TaskId,
        asset_id: String,
    },

    Failed {
        task_id: TaskId,
        error: String,
    },

    /// The task left the visible set (cancel, dismiss or linger expiry).
    Removed {
        task_id: TaskId,
    },
}

pub enum ManagerCommand {
    Add {
        file_path: PathBuf,
        descriptor: ProcessingDescriptor,
        reply: oneshot::Sender<Result<TaskId>>,
    },

    /// Only valid from `Error`; reuses the stored descriptor and session.
    Retry {
        task_id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Aborts the in-flight work and removes the task immediately. Partial
    /// remote state is deliberately left behind.
    Cancel {
        task_id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Removes a terminal (error/completed) task from the visible set.
    Dismiss {
        task_id: TaskId,
        reply: oneshot::Sender<Result<()>>,
    },

    Get {
        task_id: TaskId,
        reply: oneshot::Sender<Option<UploadTask>>,
    },

    List {
        reply: oneshot::Sender<Vec<UploadTask>>,
    },
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Resumable endpoint of the raw object storage.
    pub endpoint: String,
    /// How long completed tasks stay visible before auto-removal.
    pub completed_linger: Duration,
}

impl ManagerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            completed_linger: Duration::from_secs(5),
        }
    }

    pub fn with_completed_linger(mut self, linger: Duration) -> Self {
        self.completed_linger = linger;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use TaskState::*;
        assert!(Uploading.can_transition(Processing));
        assert!(Uploading.can_transition(Error));
        assert!(Processing.can_transition(Completed));
        assert!(Processing.can_transition(Error));
        assert!(Error.can_transition(Uploading));
    }

    #[test]
    fn test_illegal_transitions() {
        use TaskState::*;
        // completed is terminal
        assert!(!Completed.can_transition(Uploading));
        assert!(!Completed.can_transition(Error));
        // no skipping the processing stage
        assert!(!Uploading.can_transition(Completed));
        // error recovers only through a fresh upload
        assert!(!Error.can_transition(Processing));
        assert!(!Error.can_transition(Completed));
        // no self-loops
        assert!(!Uploading.can_transition(Uploading));
    }
}

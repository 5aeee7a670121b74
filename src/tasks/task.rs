use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::catalog::ContentKind;
use crate::publish::ProcessingDescriptor;
use super::types::{TaskId, TaskState};

/// A background ingestion task: one source file, one storage object, one
/// destination. The descriptor never changes after creation; retries run
/// the exact same work again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: TaskId,
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Storage object key; its stem is the task id.
    pub object_key: String,
    pub descriptor: ProcessingDescriptor,
    pub state: TaskState,
    /// 0-100, non-decreasing while uploading.
    pub progress: u8,
    /// Session URL of the current transfer, kept for resume on retry.
    pub session_url: Option<String>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UploadTask {
    pub fn kind(&self) -> ContentKind {
        self.descriptor.kind
    }
}

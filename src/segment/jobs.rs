use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub preview_url: Option<String>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory registry of preview jobs, polled by clients until a terminal
/// status. Records live for the lifetime of the process.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let record = JobRecord {
            id,
            status: JobStatus::Queued,
            preview_url: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        };
        self.jobs.write().await.insert(id, record);

        id
    }

    /// Registers an already-finished job for outputs that were found cached.
    pub async fn create_completed(&self, preview_url: impl Into<String>) -> JobRecord {
        let id = Uuid::new_v4();
        let record = JobRecord {
            id,
            status: JobStatus::Completed,
            preview_url: Some(preview_url.into()),
            error: None,
            submitted_at: Utc::now(),
            finished_at: Some(Utc::now()),
        };
        self.jobs.write().await.insert(id, record.clone());

        record
    }

    pub async fn mark_running(&self, id: Uuid) {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            record.status = JobStatus::Running;
        }
    }

    pub async fn complete(&self, id: Uuid, preview_url: impl Into<String>) {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            record.status = JobStatus::Completed;
            record.preview_url = Some(preview_url.into());
            record.finished_at = Some(Utc::now());
        }
    }

    pub async fn fail(&self, id: Uuid, error: impl Into<String>) {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            record.status = JobStatus::Error;
            record.error = Some(error.into());
            record.finished_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }
}

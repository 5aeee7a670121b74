use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::catalog::PublishRecord;
use crate::transfer::{ProgressSender, SessionMeta, TransferClient, TransferError};
use super::pipeline::TaskPipeline;
use super::task::UploadTask;
use super::types::TaskId;

pub(crate) enum WorkerUpdate {
    /// Transfer session resolved; stored on the task for later resumes.
    Session {
        task_id: TaskId,
        session_url: String,
    },

    Progress {
        task_id: TaskId,
        transferred: u64,
        total: u64,
    },

    /// Raw bytes fully in storage; the pipeline stage is starting.
    Staged {
        task_id: TaskId,
    },

    Finished {
        task_id: TaskId,
        result: anyhow::Result<PublishRecord>,
    },

    /// Internal: a completed task's linger elapsed.
    Expired {
        task_id: TaskId,
    },
}

pub(crate) struct TaskWorker {
    pub(crate) client: TransferClient,
    pub(crate) pipeline: Arc<dyn TaskPipeline>,
    pub(crate) endpoint: String,
    pub(crate) updates: mpsc::UnboundedSender<WorkerUpdate>,
    pub(crate) cancellation_token: CancellationToken,
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

impl TaskWorker {
    pub(crate) async fn run(self, task: UploadTask) {
        let task_id = task.id;
        let result = self.execute(&task).await;
        let _ = self.updates.send(WorkerUpdate::Finished { task_id, result });
    }

    async fn execute(&self, task: &UploadTask) -> anyhow::Result<PublishRecord> {
        let meta = SessionMeta::new(&task.object_key)
            .with_content_type(content_type_for(&task.file_path));

        let (session_url, offset) = tokio::select! {
            result = self.client.resolve_session(
                &self.endpoint,
                task.file_size,
                &meta,
                task.session_url.as_deref(),
            ) => result?,
            _ = self.cancellation_token.cancelled() => {
                return Err(TransferError::Cancelled.into());
            }
        };
        let _ = self.updates.send(WorkerUpdate::Session {
            task_id: task.id,
            session_url: session_url.clone(),
        });

        let (progress, mut progress_rx) = ProgressSender::channel(task.file_size);
        let forward = tokio::spawn({
            let updates = self.updates.clone();
            let task_id = task.id;
            async move {
                while let Some(update) = progress_rx.recv().await {
                    let _ = updates.send(WorkerUpdate::Progress {
                        task_id,
                        transferred: update.transferred,
                        total: update.total,
                    });
                }
            }
        });

        let transferred = self
            .client
            .transfer(
                &task.file_path,
                &session_url,
                task.file_size,
                offset,
                &progress,
                &self.cancellation_token,
            )
            .await;
        drop(progress);
        let _ = forward.await;
        transferred?;

        let _ = self.updates.send(WorkerUpdate::Staged { task_id: task.id });

        tokio::select! {
            result = self.pipeline.run(task, self.cancellation_token.clone()) => result,
            _ = self.cancellation_token.cancelled() => {
                Err(TransferError::Cancelled.into())
            }
        }
    }
}

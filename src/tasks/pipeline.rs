use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::catalog::PublishRecord;
use super::task::UploadTask;

/// Post-upload stage of a task: everything that happens after the raw bytes
/// are in object storage, ending with a catalogued publish. The manager
/// flips the task to `Processing` before calling this.
#[async_trait]
pub trait TaskPipeline: Send + Sync {
    async fn run(&self, task: &UploadTask, cancel: CancellationToken)
    -> anyhow::Result<PublishRecord>;
}

use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::catalog::PublishRecord;
use crate::tasks::{TaskPipeline, UploadTask};
use super::publisher::Publisher;

/// Default post-upload stage: publish the stored object, cutting first when
/// the descriptor carries trim ranges.
pub struct PublishPipeline {
    publisher: Arc<Publisher>,
}

impl PublishPipeline {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl TaskPipeline for PublishPipeline {
    async fn run(
        &self,
        task: &UploadTask,
        cancel: CancellationToken,
    ) -> anyhow::Result<PublishRecord> {
        let record = if task.descriptor.cuts.is_empty() {
            self.publisher
                .publish_stored(&task.object_key, &task.descriptor, &cancel)
                .await?
        } else {
            self.publisher
                .publish_processed(&task.object_key, &task.descriptor, &cancel)
                .await?
        };

        Ok(record)
    }
}

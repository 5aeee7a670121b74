use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::publish::ProcessingDescriptor;
use crate::transfer::TransferClient;
use super::errors::{Result, TaskError};
use super::manager_worker::TaskManagerWorker;
use super::pipeline::TaskPipeline;
use super::task::UploadTask;
use super::types::{ManagerCommand, ManagerConfig, TaskEvent, TaskId};

/// Command-channel front of the task registry. Cheap to clone; all state
/// lives in the single manager worker.
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<TaskEvent>,
}

pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|_| TaskError::ManagerShutdown)
    }
}

impl UploadManager {
    pub fn new(
        client: TransferClient,
        pipeline: Arc<dyn TaskPipeline>,
        config: ManagerConfig,
    ) -> UploadManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(TaskManagerWorker::run(
            client,
            pipeline,
            config,
            command_rx,
            event_tx.clone(),
        ));

        UploadManagerHandle {
            manager: Self { command_tx, event_tx },
            worker_handle,
        }
    }

    /// Queues a file for ingestion. The task is visible and uploading
    /// immediately.
    pub async fn add_task(
        &self,
        file_path: PathBuf,
        descriptor: ProcessingDescriptor,
    ) -> Result<TaskId> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Add {
                file_path,
                descriptor,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)?
    }

    pub async fn retry_task(&self, task_id: TaskId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Retry { task_id, reply: reply_tx })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)?
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Cancel { task_id, reply: reply_tx })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)?
    }

    pub async fn dismiss_task(&self, task_id: TaskId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Dismiss { task_id, reply: reply_tx })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)?
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Option<UploadTask>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Get { task_id, reply: reply_tx })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)
    }

    pub async fn tasks(&self) -> Result<Vec<UploadTask>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::List { reply: reply_tx })
            .await
            .map_err(|_| TaskError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| TaskError::ManagerShutdown)
    }

    /// Subscribes to task events. Slow receivers can lag and miss events;
    /// each subscriber gets its own copy of the stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }
}

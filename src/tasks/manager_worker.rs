use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::publish::ProcessingDescriptor;
use crate::transfer::{TransferClient, TransferProgress};
use super::errors::{Result, TaskError};
use super::pipeline::TaskPipeline;
use super::task::UploadTask;
use super::types::{ManagerCommand, ManagerConfig, TaskEvent, TaskId, TaskState};
use super::worker::{TaskWorker, WorkerUpdate};

struct TaskHandle {
    task: UploadTask,
    cancellation_token: Option<CancellationToken>,
    join_handle: Option<JoinHandle<()>>,
}

pub(crate) struct TaskManagerWorker {
    client: TransferClient,
    pipeline: Arc<dyn TaskPipeline>,
    config: ManagerConfig,
    tasks: HashMap<TaskId, TaskHandle>,

    event_tx: broadcast::Sender<TaskEvent>,
    updates_tx: mpsc::UnboundedSender<WorkerUpdate>,
    updates_rx: mpsc::UnboundedReceiver<WorkerUpdate>,
}

impl TaskManagerWorker {
    pub(crate) async fn run(
        client: TransferClient,
        pipeline: Arc<dyn TaskPipeline>,
        config: ManagerConfig,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<TaskEvent>,
    ) {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            client,
            pipeline,
            config,
            tasks: HashMap::new(),
            event_tx,
            updates_tx,
            updates_rx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command).await,
                    None => break,
                },
                Some(update) = worker.updates_rx.recv() => {
                    worker.handle_update(update);
                }
            }
        }

        // manager dropped: stop outstanding workers
        for handle in worker.tasks.values() {
            if let Some(token) = &handle.cancellation_token {
                token.cancel();
            }
        }
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Add { file_path, descriptor, reply } => {
                let result = self.add_task(file_path, descriptor).await;
                let _ = reply.send(result);
            }
            ManagerCommand::Retry { task_id, reply } => {
                let _ = reply.send(self.retry_task(task_id));
            }
            ManagerCommand::Cancel { task_id, reply } => {
                let _ = reply.send(self.cancel_task(task_id));
            }
            ManagerCommand::Dismiss { task_id, reply } => {
                let _ = reply.send(self.dismiss_task(task_id));
            }
            ManagerCommand::Get { task_id, reply } => {
                let task = self.tasks.get(&task_id).map(|handle| handle.task.clone());
                let _ = reply.send(task);
            }
            ManagerCommand::List { reply } => {
                let tasks: Vec<_> = self
                    .tasks
                    .values()
                    .map(|handle| handle.task.clone())
                    .collect();
                let _ = reply.send(tasks);
            }
        }
    }

    fn handle_update(&mut self, update: WorkerUpdate) {
        match update {
            WorkerUpdate::Session { task_id, session_url } => {
                if let Some(handle) = self.tasks.get_mut(&task_id) {
                    handle.task.session_url = Some(session_url);
                }
            }
            WorkerUpdate::Progress { task_id, transferred, total } => {
                self.handle_progress(task_id, transferred, total);
            }
            WorkerUpdate::Staged { task_id } => {
                self.transition(task_id, TaskState::Processing);
            }
            WorkerUpdate::Finished { task_id, result } => {
                self.handle_finished(task_id, result);
            }
            WorkerUpdate::Expired { task_id } => {
                let expired = self
                    .tasks
                    .get(&task_id)
                    .is_some_and(|handle| handle.task.state == TaskState::Completed);
                if expired {
                    self.tasks.remove(&task_id);
                    let _ = self.event_tx.send(TaskEvent::Removed { task_id });
                }
            }
        }
    }

    fn handle_progress(&mut self, task_id: TaskId, transferred: u64, total: u64) {
        let Some(handle) = self.tasks.get_mut(&task_id) else {
            // task was cancelled while updates were in flight
            return;
        };
        if handle.task.state != TaskState::Uploading {
            return;
        }

        let percent = TransferProgress { transferred, total }.percentage();
        if percent > handle.task.progress {
            handle.task.progress = percent;
            let _ = self.event_tx.send(TaskEvent::Progress {
                task_id,
                transferred,
                total,
                percent,
            });
        }
    }

    fn handle_finished(&mut self, task_id: TaskId, result: anyhow::Result<crate::catalog::PublishRecord>) {
        if !self.tasks.contains_key(&task_id) {
            debug!(%task_id, "ignoring result for removed task");
            return;
        }

        match result {
            Ok(record) => {
                if !self.transition(task_id, TaskState::Completed) {
                    return;
                }
                if let Some(handle) = self.tasks.get_mut(&task_id) {
                    handle.task.progress = 100;
                    handle.task.completed_at = Some(chrono::Utc::now());
                    handle.cancellation_token = None;
                    handle.join_handle = None;
                }
                let _ = self.event_tx.send(TaskEvent::Completed {
                    task_id,
                    asset_id: record.asset_id,
                });

                // completed tasks linger briefly, then leave the visible set
                let updates_tx = self.updates_tx.clone();
                let linger = self.config.completed_linger;
                tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    let _ = updates_tx.send(WorkerUpdate::Expired { task_id });
                });
            }
            Err(err) => {
                let error = format!("{:#}", err);
                if !self.transition(task_id, TaskState::Error) {
                    return;
                }
                if let Some(handle) = self.tasks.get_mut(&task_id) {
                    handle.task.error = Some(error.clone());
                    handle.cancellation_token = None;
                    handle.join_handle = None;
                }
                let _ = self.event_tx.send(TaskEvent::Failed { task_id, error });
            }
        }
    }

    async fn add_task(
        &mut self,
        file_path: PathBuf,
        descriptor: ProcessingDescriptor,
    ) -> Result<TaskId> {
        let file_metadata = tokio::fs::metadata(&file_path).await?;
        if !file_metadata.is_file() {
            return Err(TaskError::InvalidFile("not a regular file".to_string()));
        }

        let task_id = TaskId::new();
        let extension = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let object_key = format!("raw/{}.{}", task_id, extension);

        let task = UploadTask {
            id: task_id,
            file_path,
            file_size: file_metadata.len(),
            object_key,
            descriptor,
            state: TaskState::Uploading,
            progress: 0,
            session_url: None,
            error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.tasks.insert(task_id, TaskHandle {
            task,
            cancellation_token: None,
            join_handle: None,
        });
        let _ = self.event_tx.send(TaskEvent::Added { task_id });
        self.start_task(task_id);

        Ok(task_id)
    }

    fn retry_task(&mut self, task_id: TaskId) -> Result<()> {
        let handle = self
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;

        if handle.task.state != TaskState::Error {
            return Err(TaskError::InvalidState {
                action: "retry",
                state: handle.task.state,
            });
        }

        handle.task.error = None;
        self.transition(task_id, TaskState::Uploading);
        self.start_task(task_id);

        Ok(())
    }

    fn cancel_task(&mut self, task_id: TaskId) -> Result<()> {
        let handle = self
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;

        match handle.task.state {
            TaskState::Uploading | TaskState::Processing => {
                if let Some(token) = &handle.cancellation_token {
                    token.cancel();
                }
                self.tasks.remove(&task_id);
                let _ = self.event_tx.send(TaskEvent::Removed { task_id });

                Ok(())
            }
            state => Err(TaskError::InvalidState { action: "cancel", state }),
        }
    }

    fn dismiss_task(&mut self, task_id: TaskId) -> Result<()> {
        let handle = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;

        match handle.task.state {
            TaskState::Error | TaskState::Completed => {
                self.tasks.remove(&task_id);
                let _ = self.event_tx.send(TaskEvent::Removed { task_id });

                Ok(())
            }
            state => Err(TaskError::InvalidState { action: "dismiss", state }),
        }
    }

    fn start_task(&mut self, task_id: TaskId) {
        let Some(handle) = self.tasks.get_mut(&task_id) else {
            return;
        };

        let cancellation_token = CancellationToken::new();
        handle.cancellation_token = Some(cancellation_token.clone());
        handle.task.started_at = Some(chrono::Utc::now());

        let worker = TaskWorker {
            client: self.client.clone(),
            pipeline: self.pipeline.clone(),
            endpoint: self.config.endpoint.clone(),
            updates: self.updates_tx.clone(),
            cancellation_token,
        };

        let task = handle.task.clone();
        handle.join_handle = Some(tokio::spawn(worker.run(task)));
    }

    /// Applies a state transition if it is legal, emitting the change.
    /// Illegal transitions are rejected and logged.
    fn transition(&mut self, task_id: TaskId, new_state: TaskState) -> bool {
        let Some(handle) = self.tasks.get_mut(&task_id) else {
            return false;
        };

        let old_state = handle.task.state;
        if !old_state.can_transition(new_state) {
            warn!(%task_id, ?old_state, ?new_state, "rejected illegal state transition");
            return false;
        }

        handle.task.state = new_state;
        let _ = self.event_tx.send(TaskEvent::StateChanged {
            task_id,
            old_state,
            new_state,
        });

        true
    }
}

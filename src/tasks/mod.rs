mod errors;
mod manager;
mod manager_worker;
mod pipeline;
mod task;
mod types;
mod worker;

pub use errors::{Result, TaskError};
pub use manager::{UploadManager, UploadManagerHandle};
pub use pipeline::TaskPipeline;
pub use task::UploadTask;
pub use types::{ManagerConfig, TaskEvent, TaskId, TaskState};

pub mod catalog;
pub mod config;
pub mod publish;
pub mod remote;
pub mod segment;
pub mod server;
pub mod storage;
pub mod tasks;
pub mod transfer;
pub mod utils;

pub use catalog::{Catalog, ContentKind, MemoryCatalog, PublishRecord};
pub use config::Config;
pub use publish::{ProcessingDescriptor, PublishError, PublishPipeline, Publisher, PublisherConfig};
pub use remote::{HttpRemoteHost, RemoteError, RemoteHost};
pub use segment::{JobRegistry, JobStatus, SegmentError, SegmentProcessor, TrimRange};
pub use storage::{LocalStorage, ObjectStorage, StorageError};
pub use tasks::{
    ManagerConfig, TaskError, TaskEvent, TaskId, TaskPipeline, TaskState, UploadManager,
    UploadManagerHandle, UploadTask,
};
pub use transfer::{ProgressSender, SessionMeta, TransferClient, TransferError, TransferProgress};

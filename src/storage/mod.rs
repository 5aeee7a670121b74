mod local;

pub use local::LocalStorage;

use std::path::Path;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Raw object storage. Upload is last-writer-wins: re-putting the same key
/// after a retry overwrites the previous object.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download(&self, key: &str) -> Result<Bytes>;

    async fn upload(&self, key: &str, data: Bytes) -> Result<()>;

    /// Stores the file at `path` under `key` without holding the whole
    /// object in memory. The default buffers; real backends override it.
    async fn upload_file(&self, key: &str, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.upload(key, Bytes::from(data)).await
    }

    async fn delete(&self, key: &str) -> Result<()>;

    async fn content_length(&self, key: &str) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.content_length(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

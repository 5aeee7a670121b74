use std::path::{Component, Path, PathBuf};
use async_trait::async_trait;
use bytes::Bytes;
use super::{ObjectStorage, Result, StorageError};

/// Filesystem-backed object storage rooted at a single directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }

    fn map_io(key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn download(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| LocalStorage::map_io(key, err))?;

        Ok(Bytes::from(data))
    }

    async fn upload(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        Ok(())
    }

    async fn upload_file(&self, key: &str, source: &Path) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &path).await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| LocalStorage::map_io(key, err))
    }

    async fn content_length(&self, key: &str) -> Result<u64> {
        let path = self.resolve(key)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| LocalStorage::map_io(key, err))?;

        Ok(metadata.len())
    }
}

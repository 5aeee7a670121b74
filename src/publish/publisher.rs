use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::catalog::{Catalog, PublishRecord};
use crate::remote::RemoteHost;
use crate::segment::SegmentProcessor;
use crate::storage::ObjectStorage;
use crate::transfer::{ProgressSender, TransferClient};
use crate::utils::{RetryStrategy, retry_with};
use super::{ProcessingDescriptor, PublishError, Result};

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Scratch space for per-publish working directories.
    pub work_root: PathBuf,
    /// How long to poll the host for a finished transcode (non-zero
    /// duration plus generated thumbnail) before falling back to the CDN
    /// naming convention.
    pub status_poll_attempts: u32,
    pub status_poll_interval: Duration,
    /// Bounded retry around negotiate+transfer on the server-side path.
    pub publish_attempts: u32,
    pub publish_backoff: Duration,
    pub publish_backoff_cap: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("uplink"),
            status_poll_attempts: 20,
            status_poll_interval: Duration::from_secs(5),
            publish_attempts: 2,
            publish_backoff: Duration::from_secs(5),
            publish_backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Runs the publish protocol: acquire → negotiate → transfer → finalize →
/// cleanup.
///
/// Failures before any byte reaches the host leave the catalog untouched so
/// the caller can simply retry. Once bytes have been transferred, a failed
/// finalize writes an error marker and logs the asset id loudly, because at
/// that point the asset exists remotely whether the catalog knows it or not.
pub struct Publisher {
    storage: Arc<dyn ObjectStorage>,
    host: Arc<dyn RemoteHost>,
    catalog: Arc<dyn Catalog>,
    transfer: TransferClient,
    segments: SegmentProcessor,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        host: Arc<dyn RemoteHost>,
        catalog: Arc<dyn Catalog>,
        transfer: TransferClient,
        segments: SegmentProcessor,
        config: PublisherConfig,
    ) -> Self {
        Self {
            storage,
            host,
            catalog,
            transfer,
            segments,
            config,
        }
    }

    /// Publishes a raw stored object as-is (no cuts).
    pub async fn publish_stored(
        &self,
        object_key: &str,
        descriptor: &ProcessingDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PublishRecord> {
        let scratch = self.scratch_dir().await?;
        let result = self
            .publish_stored_inner(object_key, descriptor, cancel, &scratch)
            .await;
        Publisher::remove_scratch(&scratch).await;

        result
    }

    async fn publish_stored_inner(
        &self,
        object_key: &str,
        descriptor: &ProcessingDescriptor,
        cancel: &CancellationToken,
        scratch: &Path,
    ) -> Result<PublishRecord> {
        // acquire
        let source = self.fetch_to_scratch(object_key, scratch).await?;
        let size = tokio::fs::metadata(&source).await?.len();

        // negotiate; the catalog is untouched until finalize
        let target = self
            .host
            .create_upload(size, &descriptor.title, &descriptor.description)
            .await?;
        debug!(asset_id = %target.asset_id, size, "remote upload session negotiated");

        // transfer
        self.transfer_file(&source, &target.upload_url, size, cancel)
            .await?;

        // finalize, then cleanup
        let record = self.finalize(descriptor, &target.asset_id).await?;
        self.cleanup_object(object_key).await;

        Ok(record)
    }

    /// Server-side path: cut and concatenate first, then publish the
    /// combined output. Segment failures abort before the host sees
    /// anything, so nothing is ever partially published.
    pub async fn publish_processed(
        &self,
        object_key: &str,
        descriptor: &ProcessingDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PublishRecord> {
        let scratch = self.scratch_dir().await?;
        let result = self
            .publish_processed_inner(object_key, descriptor, cancel, &scratch)
            .await;
        Publisher::remove_scratch(&scratch).await;

        result
    }

    async fn publish_processed_inner(
        &self,
        object_key: &str,
        descriptor: &ProcessingDescriptor,
        cancel: &CancellationToken,
        scratch: &Path,
    ) -> Result<PublishRecord> {
        let source = self.fetch_to_scratch(object_key, scratch).await?;
        let combined = scratch.join("combined.mp4");
        self.segments
            .cut_and_concat(&source, &descriptor.cuts, scratch, &combined)
            .await?;

        let record = self.publish_file(&combined, descriptor, cancel).await?;
        self.cleanup_object(object_key).await;

        Ok(record)
    }

    /// Publishes a local file, retrying negotiate+transfer with bounded
    /// exponential backoff before giving up.
    pub async fn publish_file(
        &self,
        path: &Path,
        descriptor: &ProcessingDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PublishRecord> {
        let size = tokio::fs::metadata(path).await?.len();

        let strategy = RetryStrategy::Exponential {
            initial: self.config.publish_backoff,
            multiplier: 2.0,
            max_delay: self.config.publish_backoff_cap,
        };
        let asset_id = retry_with(
            &strategy,
            self.config.publish_attempts,
            |err: &PublishError| !matches!(err, PublishError::Transfer(crate::transfer::TransferError::Cancelled)),
            || async {
                let target = self
                    .host
                    .create_upload(size, &descriptor.title, &descriptor.description)
                    .await?;
                self.transfer_file(path, &target.upload_url, size, cancel)
                    .await?;
                Ok::<_, PublishError>(target.asset_id)
            },
        )
        .await?;

        self.finalize(descriptor, &asset_id).await
    }

    async fn transfer_file(
        &self,
        path: &Path,
        upload_url: &str,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // the one-time URL is itself the session; only its offset is asked for
        let offset = self.transfer.fetch_offset(upload_url).await?;
        let (progress, _updates) = ProgressSender::channel(size);
        self.transfer
            .transfer(path, upload_url, size, offset, &progress, cancel)
            .await?;

        Ok(())
    }

    async fn finalize(
        &self,
        descriptor: &ProcessingDescriptor,
        asset_id: &str,
    ) -> Result<PublishRecord> {
        let record = PublishRecord {
            asset_id: asset_id.to_string(),
            playback_url: self.host.playback_url(asset_id),
            thumbnail_url: self.resolve_thumbnail(asset_id).await,
        };

        if let Err(err) = self
            .catalog
            .finalize_publish(descriptor.destination_id, descriptor.kind, &record)
            .await
        {
            error!(
                asset_id,
                destination_id = %descriptor.destination_id,
                error = %err,
                "finalize failed after transfer; asset is live on the host but not catalogued"
            );
            if let Err(mark_err) = self
                .catalog
                .mark_error(descriptor.destination_id, descriptor.kind, &err.to_string())
                .await
            {
                error!(asset_id, error = %mark_err, "could not write error marker");
            }

            return Err(PublishError::Finalize {
                asset_id: asset_id.to_string(),
                source: err,
            });
        }

        info!(
            asset_id,
            destination_id = %descriptor.destination_id,
            "publish finalized"
        );
        Ok(record)
    }

    async fn resolve_thumbnail(&self, asset_id: &str) -> String {
        for attempt in 0..self.config.status_poll_attempts {
            match self.host.asset_status(asset_id).await {
                Ok(status) => {
                    // a zero duration means the host is still transcoding;
                    // its imagery is not final yet
                    if status.duration_secs > 0.0 {
                        if let Some(url) = status.thumbnail_url {
                            return url;
                        }
                    }
                }
                Err(err) => {
                    debug!(asset_id, error = %err, "asset status poll failed");
                }
            }

            if attempt + 1 < self.config.status_poll_attempts {
                sleep(self.config.status_poll_interval).await;
            }
        }

        self.host.thumbnail_url(asset_id)
    }

    async fn fetch_to_scratch(&self, object_key: &str, scratch: &Path) -> Result<PathBuf> {
        let filename = object_key.rsplit('/').next().unwrap_or("source.mp4");
        let local = scratch.join(filename);
        let bytes = self.storage.download(object_key).await?;
        tokio::fs::write(&local, &bytes).await?;

        Ok(local)
    }

    async fn scratch_dir(&self) -> Result<PathBuf> {
        let dir = self.config.work_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;

        Ok(dir)
    }

    async fn remove_scratch(dir: &Path) {
        if let Err(err) = tokio::fs::remove_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %err, "failed to remove scratch dir");
        }
    }

    async fn cleanup_object(&self, object_key: &str) {
        if let Err(err) = self.storage.delete(object_key).await {
            warn!(object_key, error = %err, "failed to delete raw object after publish");
        }
    }
}

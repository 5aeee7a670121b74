mod pipeline;
mod publisher;

pub use pipeline::PublishPipeline;
pub use publisher::{Publisher, PublisherConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::catalog::{CatalogError, ContentKind};
use crate::remote::RemoteError;
use crate::segment::{SegmentError, TrimRange};
use crate::storage::StorageError;
use crate::transfer::TransferError;

/// Everything needed to turn a raw stored object into a published,
/// catalogued asset. Attached to a task at creation time and carried
/// verbatim through retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingDescriptor {
    pub destination_id: Uuid,
    pub kind: ContentKind,
    #[serde(default)]
    pub cuts: Vec<TrimRange>,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote host error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The asset is live on the remote host but the catalog write failed.
    /// An error marker has been written and the asset id logged; recovery
    /// is an operator action.
    #[error("Finalize failed for asset {asset_id}: {source}")]
    Finalize {
        asset_id: String,
        #[source]
        source: CatalogError,
    },
}

pub type Result<T, E = PublishError> = std::result::Result<T, E>;

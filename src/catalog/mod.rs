mod memory;

pub use memory::{DestinationRow, MemoryCatalog};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which destination column set a published asset lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Primary,
    Supplementary,
    Review,
}

/// The outcome of a successful publish, as written to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub asset_id: String,
    pub playback_url: String,
    pub thumbnail_url: String,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Destination not found: {0}")]
    NotFound(Uuid),

    #[error("Catalog backend error: {0}")]
    Backend(String),
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

pub const ERROR_MARKER_LIMIT: usize = 100;

/// Builds the literal marker written into the asset column when a publish
/// cannot be finalized, so readers never see an indefinite "processing" row.
/// The prefix counts against the limit: the whole marker is at most
/// `ERROR_MARKER_LIMIT` characters.
pub fn error_marker(message: &str) -> String {
    format!("ERROR: {}", message)
        .chars()
        .take(ERROR_MARKER_LIMIT)
        .collect()
}

/// A thumbnail may be overwritten only while it is still empty or one of the
/// generated placeholders; custom thumbnails survive re-finalize.
pub fn is_placeholder_thumbnail(current: Option<&str>) -> bool {
    match current {
        None => true,
        Some(value) => {
            value.is_empty() || value.contains("placehold") || value.contains("vumbnail")
        }
    }
}

/// Destination metadata database. Implementations live outside this crate in
/// production; rows are keyed by destination id and updated column-wise.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Writes the publish outcome into the kind-selected column set.
    /// Idempotent for a given `(destination_id, record.asset_id)` pair.
    async fn finalize_publish(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        record: &PublishRecord,
    ) -> Result<()>;

    /// Writes a truncated error marker into the kind-selected column.
    async fn mark_error(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        message: &str,
    ) -> Result<()>;
}

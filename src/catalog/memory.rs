use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use super::{
    Catalog, CatalogError, ContentKind, PublishRecord, Result, error_marker,
    is_placeholder_thumbnail,
};

/// One destination row. The per-kind columns hold either a playback URL or
/// an error marker; the thumbnail is shared across kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationRow {
    pub primary_video: Option<String>,
    pub supplementary_video: Option<String>,
    pub review_video: Option<String>,
    pub thumbnail: Option<String>,
}

impl DestinationRow {
    pub fn video(&self, kind: ContentKind) -> Option<&str> {
        match kind {
            ContentKind::Primary => self.primary_video.as_deref(),
            ContentKind::Supplementary => self.supplementary_video.as_deref(),
            ContentKind::Review => self.review_video.as_deref(),
        }
    }

    fn video_mut(&mut self, kind: ContentKind) -> &mut Option<String> {
        match kind {
            ContentKind::Primary => &mut self.primary_video,
            ContentKind::Supplementary => &mut self.supplementary_video,
            ContentKind::Review => &mut self.review_video,
        }
    }
}

/// In-memory catalog used by tests and the demo server. Real deployments
/// put their database behind the `Catalog` trait instead.
#[derive(Default)]
pub struct MemoryCatalog {
    rows: RwLock<HashMap<Uuid, DestinationRow>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty destination row, as the authoring flow does before
    /// any upload starts.
    pub async fn insert(&self, destination_id: Uuid) {
        self.rows
            .write()
            .await
            .insert(destination_id, DestinationRow::default());
    }

    pub async fn insert_with_thumbnail(&self, destination_id: Uuid, thumbnail: &str) {
        self.rows.write().await.insert(
            destination_id,
            DestinationRow {
                thumbnail: Some(thumbnail.to_string()),
                ..DestinationRow::default()
            },
        );
    }

    pub async fn row(&self, destination_id: Uuid) -> Option<DestinationRow> {
        self.rows.read().await.get(&destination_id).cloned()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn finalize_publish(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        record: &PublishRecord,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&destination_id)
            .ok_or(CatalogError::NotFound(destination_id))?;

        *row.video_mut(kind) = Some(record.playback_url.clone());
        if is_placeholder_thumbnail(row.thumbnail.as_deref()) {
            row.thumbnail = Some(record.thumbnail_url.clone());
        }

        Ok(())
    }

    async fn mark_error(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        message: &str,
    ) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&destination_id)
            .ok_or(CatalogError::NotFound(destination_id))?;

        *row.video_mut(kind) = Some(error_marker(message));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(asset_id: &str) -> PublishRecord {
        PublishRecord {
            asset_id: asset_id.to_string(),
            playback_url: format!("https://player.example.com/video/{}", asset_id),
            thumbnail_url: format!("https://vumbnail.com/{}.jpg", asset_id),
        }
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let destination = Uuid::new_v4();
        catalog.insert(destination).await;

        catalog
            .finalize_publish(destination, ContentKind::Primary, &record("42"))
            .await
            .unwrap();
        let first = catalog.row(destination).await.unwrap();

        catalog
            .finalize_publish(destination, ContentKind::Primary, &record("42"))
            .await
            .unwrap();
        let second = catalog.row(destination).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            second.video(ContentKind::Primary),
            Some("https://player.example.com/video/42")
        );
    }

    #[tokio::test]
    async fn test_kinds_select_distinct_columns() {
        let catalog = MemoryCatalog::new();
        let destination = Uuid::new_v4();
        catalog.insert(destination).await;

        catalog
            .finalize_publish(destination, ContentKind::Primary, &record("a"))
            .await
            .unwrap();
        catalog
            .finalize_publish(destination, ContentKind::Review, &record("b"))
            .await
            .unwrap();

        let row = catalog.row(destination).await.unwrap();
        assert!(row.video(ContentKind::Primary).unwrap().ends_with("/a"));
        assert!(row.video(ContentKind::Review).unwrap().ends_with("/b"));
        assert_eq!(row.video(ContentKind::Supplementary), None);
    }

    #[tokio::test]
    async fn test_custom_thumbnail_survives_finalize() {
        let catalog = MemoryCatalog::new();
        let destination = Uuid::new_v4();
        catalog
            .insert_with_thumbnail(destination, "https://cdn.example.com/custom.jpg")
            .await;

        catalog
            .finalize_publish(destination, ContentKind::Primary, &record("42"))
            .await
            .unwrap();

        let row = catalog.row(destination).await.unwrap();
        assert_eq!(row.thumbnail.as_deref(), Some("https://cdn.example.com/custom.jpg"));
    }

    #[tokio::test]
    async fn test_placeholder_thumbnail_is_replaced() {
        let catalog = MemoryCatalog::new();
        let destination = Uuid::new_v4();
        catalog
            .insert_with_thumbnail(destination, "https://placehold.co/640x360")
            .await;

        catalog
            .finalize_publish(destination, ContentKind::Primary, &record("42"))
            .await
            .unwrap();

        let row = catalog.row(destination).await.unwrap();
        assert_eq!(row.thumbnail.as_deref(), Some("https://vumbnail.com/42.jpg"));
    }

    #[tokio::test]
    async fn test_mark_error_writes_marker_and_finalize_clears_it() {
        let catalog = MemoryCatalog::new();
        let destination = Uuid::new_v4();
        catalog.insert(destination).await;

        catalog
            .mark_error(destination, ContentKind::Supplementary, "db write failed")
            .await
            .unwrap();
        let row = catalog.row(destination).await.unwrap();
        assert_eq!(
            row.video(ContentKind::Supplementary),
            Some("ERROR: db write failed")
        );

        catalog
            .finalize_publish(destination, ContentKind::Supplementary, &record("42"))
            .await
            .unwrap();
        let row = catalog.row(destination).await.unwrap();
        assert!(row.video(ContentKind::Supplementary).unwrap().starts_with("https://"));
    }

    #[tokio::test]
    async fn test_unknown_destination_is_an_error() {
        let catalog = MemoryCatalog::new();
        let result = catalog
            .finalize_publish(Uuid::new_v4(), ContentKind::Primary, &record("42"))
            .await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }
}

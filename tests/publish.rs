mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use uplink::catalog::{Catalog, CatalogError, ContentKind, MemoryCatalog, PublishRecord};
use uplink::publish::{
    ProcessingDescriptor, PublishError, PublishPipeline, Publisher, PublisherConfig,
};
use uplink::remote::{AssetStatus, RemoteError, RemoteHost, UploadTarget};
use uplink::segment::{SegmentProcessor, TrimRange};
use uplink::storage::{LocalStorage, ObjectStorage, StorageError};
use uplink::tasks::{ManagerConfig, TaskEvent, UploadManager};
use uplink::transfer::{SessionMeta, TransferClient};
use common::{ResumableState, payload, spawn_resumable};

/// Host double backed by the mock resumable server: `create_upload` opens a
/// real session there, so the transfer leg runs end to end.
struct ScriptedHost {
    transfer: TransferClient,
    endpoint: String,
    create_calls: AtomicUsize,
    /// How many leading `create_upload` calls fail.
    fail_creates: AtomicUsize,
    asset_counter: AtomicUsize,
    /// While set, status polls report a zero duration: transcode not done.
    still_transcoding: AtomicBool,
}

impl ScriptedHost {
    fn new(endpoint: String) -> Self {
        Self {
            transfer: TransferClient::new(64 * 1024),
            endpoint,
            create_calls: AtomicUsize::new(0),
            fail_creates: AtomicUsize::new(0),
            asset_counter: AtomicUsize::new(0),
            still_transcoding: AtomicBool::new(false),
        }
    }

    fn fail_next_creates(&self, count: usize) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteHost for ScriptedHost {
    async fn create_upload(
        &self,
        size: u64,
        title: &str,
        _description: &str,
    ) -> Result<UploadTarget, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteError::api(503, "host unavailable"));
        }

        let upload_url = self
            .transfer
            .create_session(&self.endpoint, size, &SessionMeta::new(title))
            .await
            .map_err(|err| RemoteError::api(500, err.to_string()))?;
        let n = self.asset_counter.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(UploadTarget {
            upload_url,
            asset_id: format!("asset-{n}"),
        })
    }

    async fn asset_status(&self, asset_id: &str) -> Result<AssetStatus, RemoteError> {
        if self.still_transcoding.load(Ordering::SeqCst) {
            return Ok(AssetStatus {
                asset_id: asset_id.to_string(),
                duration_secs: 0.0,
                thumbnail_url: Some("https://host.example.com/pending.jpg".to_string()),
            });
        }

        Ok(AssetStatus {
            asset_id: asset_id.to_string(),
            duration_secs: 12.0,
            thumbnail_url: Some(format!("https://vumbnail.com/{asset_id}.jpg")),
        })
    }

    async fn delete_asset(&self, _asset_id: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    fn playback_url(&self, asset_id: &str) -> String {
        format!("https://player.example.com/video/{asset_id}")
    }

    fn thumbnail_url(&self, asset_id: &str) -> String {
        format!("https://vumbnail.com/{asset_id}.jpg")
    }
}

/// Storage double that answers every key with the same bytes, standing in
/// for the gateway-backed store the client uploads through.
struct StaticStorage {
    data: Bytes,
    deleted: Mutex<HashSet<String>>,
}

impl StaticStorage {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            deleted: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl ObjectStorage for StaticStorage {
    async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
        if self.deleted.lock().await.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.data.clone())
    }

    async fn upload(&self, _key: &str, _data: Bytes) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.deleted.lock().await.insert(key.to_string());
        Ok(())
    }

    async fn content_length(&self, key: &str) -> Result<u64, StorageError> {
        if self.deleted.lock().await.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.data.len() as u64)
    }
}

/// Catalog whose finalize can be made to fail while `mark_error` keeps
/// working, mimicking a database that rejects the row update.
struct FailingCatalog {
    inner: MemoryCatalog,
    fail_finalize: AtomicBool,
}

impl FailingCatalog {
    fn new() -> Self {
        Self {
            inner: MemoryCatalog::new(),
            fail_finalize: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Catalog for FailingCatalog {
    async fn finalize_publish(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        record: &PublishRecord,
    ) -> Result<(), CatalogError> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(CatalogError::Backend("db write failed".to_string()));
        }
        self.inner.finalize_publish(destination_id, kind, record).await
    }

    async fn mark_error(
        &self,
        destination_id: Uuid,
        kind: ContentKind,
        message: &str,
    ) -> Result<(), CatalogError> {
        self.inner.mark_error(destination_id, kind, message).await
    }
}

struct Harness {
    state: Arc<ResumableState>,
    storage: Arc<LocalStorage>,
    host: Arc<ScriptedHost>,
    publisher: Publisher,
    work: tempfile::TempDir,
    _store_dir: tempfile::TempDir,
}

async fn harness_with(catalog: Arc<dyn Catalog>, tool: &str) -> Harness {
    let state = Arc::new(ResumableState::default());
    let endpoint = spawn_resumable(state.clone()).await;

    let store_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(store_dir.path()));
    let host = Arc::new(ScriptedHost::new(endpoint));
    let work = tempfile::tempdir().unwrap();

    let config = PublisherConfig {
        work_root: work.path().to_path_buf(),
        status_poll_attempts: 1,
        status_poll_interval: Duration::from_millis(10),
        publish_attempts: 2,
        publish_backoff: Duration::from_millis(10),
        publish_backoff_cap: Duration::from_millis(20),
    };
    let publisher = Publisher::new(
        storage.clone(),
        host.clone(),
        catalog,
        TransferClient::new(64 * 1024)
            .with_retry_delays(vec![Duration::ZERO, Duration::from_millis(10)]),
        SegmentProcessor::new(tool),
        config,
    );

    Harness {
        state,
        storage,
        host,
        publisher,
        work,
        _store_dir: store_dir,
    }
}

fn descriptor(destination_id: Uuid, kind: ContentKind) -> ProcessingDescriptor {
    ProcessingDescriptor {
        destination_id,
        kind,
        cuts: Vec::new(),
        title: "lecture".to_string(),
        description: "first take".to_string(),
    }
}

#[tokio::test]
async fn test_stored_object_is_published_finalized_and_cleaned_up() {
    let catalog = Arc::new(MemoryCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;

    let data = payload(200 * 1024);
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(data.clone()))
        .await
        .unwrap();

    let record = harness
        .publisher
        .publish_stored(
            "raw/vid.mp4",
            &descriptor(destination, ContentKind::Primary),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(record.asset_id, "asset-1");
    assert_eq!(record.playback_url, "https://player.example.com/video/asset-1");
    assert_eq!(record.thumbnail_url, "https://vumbnail.com/asset-1.jpg");

    let row = catalog.row(destination).await.unwrap();
    assert_eq!(row.video(ContentKind::Primary), Some(record.playback_url.as_str()));
    assert_eq!(row.thumbnail.as_deref(), Some(record.thumbnail_url.as_str()));

    // every byte reached the host, and the raw object is gone
    assert_eq!(harness.state.stored_lengths().await, vec![data.len()]);
    assert!(!harness.storage.exists("raw/vid.mp4").await.unwrap());
}

#[tokio::test]
async fn test_negotiate_failure_leaves_catalog_and_object_untouched() {
    let catalog = Arc::new(MemoryCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(payload(64 * 1024)))
        .await
        .unwrap();

    harness.host.fail_next_creates(1);
    let result = harness
        .publisher
        .publish_stored(
            "raw/vid.mp4",
            &descriptor(destination, ContentKind::Primary),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(PublishError::Remote(_))));

    // nothing happened from the catalog's point of view; a plain retry works
    let row = catalog.row(destination).await.unwrap();
    assert_eq!(row.video(ContentKind::Primary), None);
    assert!(harness.storage.exists("raw/vid.mp4").await.unwrap());
}

#[tokio::test]
async fn test_finalize_failure_marks_error_and_reports_asset() {
    let catalog = Arc::new(FailingCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.inner.insert(destination).await;
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(payload(64 * 1024)))
        .await
        .unwrap();

    let result = harness
        .publisher
        .publish_stored(
            "raw/vid.mp4",
            &descriptor(destination, ContentKind::Supplementary),
            &CancellationToken::new(),
        )
        .await;

    // the asset is live remotely; the error names it for the operator
    match result {
        Err(PublishError::Finalize { asset_id, .. }) => assert_eq!(asset_id, "asset-1"),
        other => panic!("expected finalize error, got {other:?}"),
    }

    let row = catalog.inner.row(destination).await.unwrap();
    let marker = row.video(ContentKind::Supplementary).unwrap();
    assert!(marker.starts_with("ERROR: "));
    assert!(marker.contains("db write failed"));

    // the transfer did finish, but the raw object is kept for recovery
    assert_eq!(harness.state.stored_lengths().await, vec![64 * 1024]);
    assert!(harness.storage.exists("raw/vid.mp4").await.unwrap());
}

#[tokio::test]
async fn test_thumbnail_falls_back_while_host_is_still_transcoding() {
    let catalog = Arc::new(MemoryCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(payload(64 * 1024)))
        .await
        .unwrap();

    // zero duration: the provisional imagery must not be taken
    harness.host.still_transcoding.store(true, Ordering::SeqCst);
    let record = harness
        .publisher
        .publish_stored(
            "raw/vid.mp4",
            &descriptor(destination, ContentKind::Primary),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(record.thumbnail_url, "https://vumbnail.com/asset-1.jpg");
    let row = catalog.row(destination).await.unwrap();
    assert_eq!(row.thumbnail.as_deref(), Some("https://vumbnail.com/asset-1.jpg"));
}

#[tokio::test]
async fn test_local_file_publish_retries_failed_negotiation() {
    let catalog = Arc::new(MemoryCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;

    let file = harness.work.path().join("combined.mp4");
    tokio::fs::write(&file, payload(100 * 1024)).await.unwrap();

    harness.host.fail_next_creates(1);
    let record = harness
        .publisher
        .publish_file(
            &file,
            &descriptor(destination, ContentKind::Review),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(harness.host.create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(record.asset_id, "asset-1");

    let row = catalog.row(destination).await.unwrap();
    assert_eq!(row.video(ContentKind::Review), Some(record.playback_url.as_str()));
}

#[tokio::test]
async fn test_segment_failure_aborts_before_any_remote_call() {
    let catalog = Arc::new(MemoryCatalog::new());
    // `false` exits non-zero, so every cut fails
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(payload(64 * 1024)))
        .await
        .unwrap();

    let mut descriptor = descriptor(destination, ContentKind::Primary);
    descriptor.cuts = vec![
        TrimRange { start: 0.0, end: 5.0 },
        TrimRange { start: 10.0, end: 12.5 },
    ];

    let result = harness
        .publisher
        .publish_processed("raw/vid.mp4", &descriptor, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(PublishError::Segment(_))));
    assert_eq!(harness.host.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.state.object_count().await, 0);

    let row = catalog.row(destination).await.unwrap();
    assert_eq!(row.video(ContentKind::Primary), None);
    assert!(harness.storage.exists("raw/vid.mp4").await.unwrap());
}

#[tokio::test]
async fn test_processed_publish_with_no_cuts_passes_source_through() {
    let catalog = Arc::new(MemoryCatalog::new());
    let harness = harness_with(catalog.clone(), "false").await;

    let destination = Uuid::new_v4();
    catalog.insert(destination).await;

    let data = payload(150 * 1024);
    harness
        .storage
        .upload("raw/vid.mp4", Bytes::from(data.clone()))
        .await
        .unwrap();

    let record = harness
        .publisher
        .publish_processed(
            "raw/vid.mp4",
            &descriptor(destination, ContentKind::Primary),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(record.asset_id, "asset-1");
    assert_eq!(harness.state.stored_lengths().await, vec![data.len()]);
    assert!(!harness.storage.exists("raw/vid.mp4").await.unwrap());
}

/// Full hybrid flow: the manager uploads the raw bytes, then the publish
/// pipeline hands the stored object to the host and finalizes the catalog.
#[tokio::test]
async fn test_manager_drives_the_publish_pipeline_end_to_end() {
    let state = Arc::new(ResumableState::default());
    let endpoint = spawn_resumable(state.clone()).await;

    let data = payload(200 * 1024);
    let storage = Arc::new(StaticStorage::new(data.clone()));
    let host = Arc::new(ScriptedHost::new(endpoint.clone()));
    let catalog = Arc::new(MemoryCatalog::new());
    let destination = Uuid::new_v4();
    catalog.insert(destination).await;

    let work = tempfile::tempdir().unwrap();
    let publisher = Arc::new(Publisher::new(
        storage.clone(),
        host.clone(),
        catalog.clone(),
        TransferClient::new(64 * 1024),
        SegmentProcessor::new("false"),
        PublisherConfig {
            work_root: work.path().to_path_buf(),
            status_poll_attempts: 1,
            status_poll_interval: Duration::from_millis(10),
            publish_attempts: 2,
            publish_backoff: Duration::from_millis(10),
            publish_backoff_cap: Duration::from_millis(20),
        },
    ));
    let pipeline = Arc::new(PublishPipeline::new(publisher));

    let handle = UploadManager::new(
        TransferClient::new(64 * 1024),
        pipeline,
        ManagerConfig::new(endpoint).with_completed_linger(Duration::from_millis(500)),
    );
    let manager: &UploadManager = &handle.manager;
    let mut events = manager.subscribe_events();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("clip.mp4");
    tokio::fs::write(&file, &data).await.unwrap();

    let task_id = manager
        .add_task(file, descriptor(destination, ContentKind::Primary))
        .await
        .unwrap();

    let asset_id = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await.unwrap() {
                TaskEvent::Completed { task_id: id, asset_id } if id == task_id => {
                    return asset_id;
                }
                TaskEvent::Failed { error, .. } => panic!("task failed: {error}"),
                _ => {}
            }
        }
    })
    .await
    .expect("task never completed");
    assert_eq!(asset_id, "asset-1");

    // raw bytes went up once, the publish transfer once more
    assert_eq!(
        state.stored_lengths().await,
        vec![data.len(), data.len()]
    );

    let row = catalog.row(destination).await.unwrap();
    assert_eq!(
        row.video(ContentKind::Primary),
        Some("https://player.example.com/video/asset-1")
    );

    // the raw object was cleaned up after the successful publish
    let deleted = storage.deleted.lock().await;
    assert_eq!(deleted.len(), 1);
    assert!(deleted.iter().next().unwrap().starts_with("raw/"));
    drop(deleted);

    handle.shutdown().await.unwrap();
}

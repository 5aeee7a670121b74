use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uplink::catalog::{Catalog, MemoryCatalog};
use uplink::config::Config;
use uplink::publish::Publisher;
use uplink::remote::{HttpRemoteHost, RemoteHost};
use uplink::segment::{JobRegistry, SegmentProcessor};
use uplink::server::{self, AppState};
use uplink::storage::{LocalStorage, ObjectStorage};
use uplink::transfer::TransferClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("uplink=info,tower_http=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(&config.storage.root));
    let host: Arc<dyn RemoteHost> = Arc::new(HttpRemoteHost::new(
        &config.remote.api_base,
        &config.remote.player_base,
        &config.remote.thumbnail_base,
        &config.remote.token,
    ));
    // in-memory catalog; deployments implement `Catalog` over their database
    let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());

    let transfer = TransferClient::new(config.transfer.chunk_size)
        .with_retry_delays(config.transfer.retry_delays());
    let segments = SegmentProcessor::new(&config.media.tool);
    let publisher = Arc::new(Publisher::new(
        storage.clone(),
        host,
        catalog.clone(),
        transfer,
        segments.clone(),
        config.publisher_config(),
    ));

    let state = Arc::new(AppState {
        storage,
        registry: Arc::new(JobRegistry::new()),
        processor: Arc::new(segments),
        publisher,
        catalog,
        work_root: config.media.work_root.clone(),
        public_base: config.server.public_base.clone(),
    });

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "uplink server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

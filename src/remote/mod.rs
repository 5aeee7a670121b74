mod host;

pub use host::HttpRemoteHost;

use async_trait::async_trait;
use thiserror::Error;

/// A negotiated remote upload session.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// One-time resumable URL the bytes go to.
    pub upload_url: String,
    /// Host-assigned asset id, known before any byte is transferred.
    pub asset_id: String,
}

/// Host-side processing state of a published asset.
#[derive(Debug, Clone)]
pub struct AssetStatus {
    pub asset_id: String,
    pub duration_secs: f64,
    /// Present once the host has generated preview imagery.
    pub thumbnail_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote API error: status code {status_code}, message: {message}")]
    Api {
        status_code: u16,
        message: String,
    },

    #[error("Missing field in remote response: {0}")]
    MissingField(&'static str),
}

impl RemoteError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;

/// Third-party video host gateway.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Negotiates an upload session for `size` bytes. Nothing on the host
    /// references the asset until bytes arrive, so failures here are cheap.
    async fn create_upload(&self, size: u64, title: &str, description: &str)
    -> Result<UploadTarget>;

    async fn asset_status(&self, asset_id: &str) -> Result<AssetStatus>;

    /// Deletes a remote asset. Tolerates assets that are already gone.
    async fn delete_asset(&self, asset_id: &str) -> Result<()>;

    fn playback_url(&self, asset_id: &str) -> String;

    fn thumbnail_url(&self, asset_id: &str) -> String;
}

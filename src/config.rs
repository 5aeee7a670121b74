use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::Context;
use serde::Deserialize;
use crate::publish::PublisherConfig;
use crate::transfer::DEFAULT_CHUNK_SIZE;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub tasks: TaskSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL under which stored objects are publicly reachable.
    pub public_base: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Resumable upload endpoint of the raw object storage.
    pub resumable_endpoint: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_tool")]
    pub tool: PathBuf,
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RemoteConfig {
    pub api_base: String,
    pub player_base: String,
    pub thumbnail_base: String,
    pub token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TransferSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            retry_delays_ms: default_retry_delays_ms(),
        }
    }
}

impl TransferSettings {
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PublishSettings {
    #[serde(default = "default_poll_attempts")]
    pub status_poll_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub status_poll_interval_secs: u64,
    #[serde(default = "default_publish_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            status_poll_attempts: default_poll_attempts(),
            status_poll_interval_secs: default_poll_interval_secs(),
            attempts: default_publish_attempts(),
            backoff_secs: default_backoff_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TaskSettings {
    #[serde(default = "default_linger_secs")]
    pub completed_linger_secs: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            completed_linger_secs: default_linger_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tool() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("uplink")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![0, 1000, 3000, 5000]
}

fn default_poll_attempts() -> u32 {
    20
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_publish_attempts() -> u32 {
    2
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_backoff_cap_secs() -> u64 {
    30
}

fn default_linger_secs() -> u64 {
    5
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            work_root: self.media.work_root.clone(),
            status_poll_attempts: self.publish.status_poll_attempts,
            status_poll_interval: Duration::from_secs(self.publish.status_poll_interval_secs),
            publish_attempts: self.publish.attempts,
            publish_backoff: Duration::from_secs(self.publish.backoff_secs),
            publish_backoff_cap: Duration::from_secs(self.publish.backoff_cap_secs),
        }
    }
}

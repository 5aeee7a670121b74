use std::path::Path;
use std::time::Duration;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::time::sleep;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;
use tracing::warn;
use crate::utils::RetryStrategy;
use super::errors::{Result, TransferError};
use super::progress::{ProgressSender, ProgressStream};

pub const TUS_RESUMABLE: &str = "1.0.0";
pub const DEFAULT_CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Metadata sent with session creation (`Upload-Metadata`).
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub object_name: String,
    pub content_type: Option<String>,
}

impl SessionMeta {
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Encodes key/value pairs as `key base64(value)`, comma separated.
    pub fn encode(&self) -> String {
        let mut pairs = vec![format!(
            "objectName {}",
            BASE64_STANDARD.encode(&self.object_name)
        )];
        if let Some(content_type) = &self.content_type {
            pairs.push(format!("contentType {}", BASE64_STANDARD.encode(content_type)));
        }
        pairs.join(",")
    }
}

/// Resumable chunked upload client.
///
/// Offsets are never trusted from local state: each chunk's next offset
/// comes from the server's `Upload-Offset` response header, and every retry
/// re-validates the current offset with a HEAD request first.
#[derive(Debug, Clone)]
pub struct TransferClient {
    http: Client,
    chunk_size: usize,
    retry: RetryStrategy,
    auth_token: Option<String>,
}

impl TransferClient {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            http: Client::new(),
            chunk_size,
            retry: RetryStrategy::Schedule(vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ]),
            auth_token: None,
        }
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry = RetryStrategy::Schedule(delays);
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("Tus-Resumable", HeaderValue::from_static(TUS_RESUMABLE));
        if let Some(token) = &self.auth_token {
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    pub fn parse_offset_header(status: u16, headers: &HeaderMap) -> Result<u64> {
        match headers.get("Upload-Offset") {
            Some(value) => {
                let offset = value
                    .to_str()
                    .map_err(|err| TransferError::Param(format!("Upload-Offset: {}", err)))?
                    .parse::<u64>()
                    .map_err(|err| TransferError::Param(format!("Upload-Offset: {}", err)))?;

                Ok(offset)
            }
            None => Err(TransferError::server(
                status,
                "No 'Upload-Offset' header in response",
            )),
        }
    }

    /// Creates a new upload session and returns its URL.
    pub async fn create_session(
        &self,
        endpoint: &str,
        file_size: u64,
        meta: &SessionMeta,
    ) -> Result<String> {
        let mut headers = self.base_headers()?;
        headers.insert("Upload-Length", HeaderValue::from_str(&file_size.to_string())?);
        headers.insert("Upload-Metadata", HeaderValue::from_str(&meta.encode())?);
        // re-uploading the same object name overwrites instead of conflicting
        headers.insert("x-upsert", HeaderValue::from_static("true"));

        let response = self.http.post(endpoint).headers(headers).send().await?;

        if response.status() != StatusCode::CREATED {
            return Err(TransferError::server(
                response.status().as_u16(),
                "Failed to create upload session",
            ));
        }

        let location = match response.headers().get("location") {
            Some(loc) => loc
                .to_str()
                .map_err(|err| TransferError::Param(format!("Location: {}", err)))?
                .to_string(),
            None => {
                return Err(TransferError::server(
                    response.status().as_u16(),
                    "No 'Location' header in response",
                ));
            }
        };

        if location.starts_with("http") {
            Ok(location)
        } else {
            let url = Url::parse(endpoint)
                .map_err(|_| TransferError::Param(format!("Invalid endpoint: {:?}", endpoint)))?;
            let origin = url.origin().ascii_serialization();

            Ok(format!("{}{}", origin, location))
        }
    }

    /// Asks the server how many bytes it has for this session.
    pub async fn fetch_offset(&self, session_url: &str) -> Result<u64> {
        let headers = self.base_headers()?;
        let response = self.http.head(session_url).headers(headers).send().await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(TransferError::server(
                status.as_u16(),
                "Failed to fetch upload offset",
            ));
        }

        TransferClient::parse_offset_header(status.as_u16(), response.headers())
    }

    /// Resolves the session to transfer into. A prior session URL is probed
    /// first; if the lookup fails the transfer falls back to a fresh session
    /// starting at offset zero instead of failing the task.
    pub async fn resolve_session(
        &self,
        endpoint: &str,
        file_size: u64,
        meta: &SessionMeta,
        prior: Option<&str>,
    ) -> Result<(String, u64)> {
        if let Some(session_url) = prior {
            match self.fetch_offset(session_url).await {
                Ok(offset) => return Ok((session_url.to_string(), offset.min(file_size))),
                Err(err) => {
                    warn!(error = %err, "resume lookup failed, creating a fresh session");
                }
            }
        }

        let session_url = self.create_session(endpoint, file_size, meta).await?;
        Ok((session_url, 0))
    }

    /// Runs the chunk loop from `offset` until the server confirms all
    /// `file_size` bytes. Cancellation aborts the in-flight request.
    pub async fn transfer(
        &self,
        file_path: &Path,
        session_url: &str,
        file_size: u64,
        mut offset: u64,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<()> {
        progress.record(offset);

        while offset < file_size {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let next = self
                .send_chunk_with_retry(session_url, file_path, offset, file_size, progress, cancel)
                .await?;

            if next < offset {
                return Err(TransferError::OffsetRegression {
                    reported: next,
                    local: offset,
                });
            }

            offset = next;
            progress.record(offset);
        }

        if offset != file_size {
            return Err(TransferError::Incomplete {
                expected: file_size,
                actual: offset,
            });
        }

        Ok(())
    }

    /// Full upload: resolve the session, then transfer. Returns the session
    /// URL so callers can store it for later resumes.
    pub async fn upload(
        &self,
        file_path: &Path,
        endpoint: &str,
        file_size: u64,
        meta: &SessionMeta,
        prior: Option<&str>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (session_url, offset) = tokio::select! {
            result = self.resolve_session(endpoint, file_size, meta, prior) => result?,
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        };

        self.transfer(file_path, &session_url, file_size, offset, progress, cancel)
            .await?;

        Ok(session_url)
    }

    async fn send_chunk_with_retry(
        &self,
        session_url: &str,
        file_path: &Path,
        offset: u64,
        file_size: u64,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut attempt: u32 = 0;

        loop {
            let attempt_future = async {
                // never trust the local offset after a failure
                let current = if attempt == 0 {
                    offset
                } else {
                    self.fetch_offset(session_url).await?
                };
                if current >= file_size {
                    return Ok(current);
                }
                self.send_chunk(session_url, file_path, current, file_size, progress)
                    .await
            };

            let result = tokio::select! {
                result = attempt_future => result,
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            };

            let retries_left = self
                .retry
                .schedule_len()
                .map_or(true, |limit| attempt < limit);

            match result {
                Ok(next) => return Ok(next),
                Err(err) if err.is_transient() && retries_left => {
                    let delay = self.retry.get_delay(attempt);
                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "chunk transfer failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_chunk(
        &self,
        session_url: &str,
        file_path: &Path,
        offset: u64,
        file_size: u64,
        progress: &ProgressSender,
    ) -> Result<u64> {
        let chunk_len = (file_size - offset).min(self.chunk_size as u64);

        let mut file = File::open(file_path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let reader = ReaderStream::with_capacity(file.take(chunk_len), 64 * 1024);
        let body = reqwest::Body::wrap_stream(ProgressStream::new(
            reader,
            offset,
            progress.clone(),
        ));

        let mut headers = self.base_headers()?;
        headers.insert("Upload-Offset", HeaderValue::from_str(&offset.to_string())?);
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/offset+octet-stream"),
        );

        let response = self
            .http
            .patch(session_url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(TransferError::server(status.as_u16(), "Failed to patch chunk"));
        }

        TransferClient::parse_offset_header(status.as_u16(), response.headers())
    }
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{patch, post};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process stand-in for the resumable upload endpoint. Enforces the
/// protocol strictly: a PATCH whose offset does not match the stored length
/// is rejected, so any client that trusts a local byte counter after a
/// failure fails these tests.
#[derive(Default)]
pub struct ResumableState {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    /// One-shot fault: the first PATCH at or past this offset is rejected
    /// with a 500 before any byte is stored.
    pub fail_patch_at: Mutex<Option<u64>>,
    pub sessions_created: AtomicUsize,
}

impl ResumableState {
    pub async fn seed_session(&self, id: &str, data: Vec<u8>) {
        self.objects.lock().await.insert(id.to_string(), data);
    }

    pub async fn object(&self, session_url: &str) -> Option<Vec<u8>> {
        let id = session_url.rsplit('/').next()?;
        self.objects.lock().await.get(id).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn stored_lengths(&self) -> Vec<usize> {
        let mut lengths: Vec<_> = self
            .objects
            .lock()
            .await
            .values()
            .map(|data| data.len())
            .collect();
        lengths.sort_unstable();
        lengths
    }
}

pub async fn spawn_resumable(state: Arc<ResumableState>) -> String {
    let app = Router::new()
        .route("/files", post(create_session))
        .route("/files/{id}", patch(patch_chunk).head(head_offset))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/files", addr)
}

async fn create_session(
    State(state): State<Arc<ResumableState>>,
    headers: HeaderMap,
) -> Response {
    if headers.get("Upload-Length").is_none() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let id = Uuid::new_v4().to_string();
    state.objects.lock().await.insert(id.clone(), Vec::new());
    state
        .sessions_created
        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    (
        StatusCode::CREATED,
        [("Location", format!("/files/{}", id))],
    )
        .into_response()
}

async fn head_offset(
    State(state): State<Arc<ResumableState>>,
    Path(id): Path<String>,
) -> Response {
    match state.objects.lock().await.get(&id) {
        Some(data) => (
            StatusCode::OK,
            [
                ("Upload-Offset", data.len().to_string()),
                ("Tus-Resumable", "1.0.0".to_string()),
            ],
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn patch_chunk(
    State(state): State<Arc<ResumableState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let offset: u64 = match headers
        .get("Upload-Offset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
    {
        Some(offset) => offset,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    {
        let mut fail = state.fail_patch_at.lock().await;
        if let Some(threshold) = *fail {
            if offset >= threshold {
                *fail = None;
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let mut objects = state.objects.lock().await;
    let Some(data) = objects.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if offset != data.len() as u64 {
        return StatusCode::CONFLICT.into_response();
    }

    data.extend_from_slice(&body);
    (
        StatusCode::NO_CONTENT,
        [("Upload-Offset", data.len().to_string())],
    )
        .into_response()
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

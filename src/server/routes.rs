use std::path::Path;
use std::sync::Arc;
use axum::Json;
use axum::extract::{Multipart, State};
use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use crate::publish::ProcessingDescriptor;
use super::error::ApiError;
use super::AppState;

fn preview_url(state: &AppState, preview_key: &str) -> String {
    format!("{}/{}", state.public_base.trim_end_matches('/'), preview_key)
}

/// `POST /upload` — multipart `video` field, stored as a raw object. The
/// body is streamed to a scratch file first; raw videos do not fit in
/// memory.
pub(super) async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("video") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.mp4").to_string();
        let extension = Path::new(&filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4")
            .to_string();

        let video_id = Uuid::new_v4();
        let object_key = format!("raw/{}.{}", video_id, extension);

        tokio::fs::create_dir_all(&state.work_root).await?;
        let scratch = state.work_root.join(format!("{video_id}.upload"));
        let stored = stage_and_store(&state, &mut field, &scratch, &object_key).await;
        if let Err(err) = tokio::fs::remove_file(&scratch).await {
            warn!(file = %scratch.display(), error = %err, "failed to remove staged upload");
        }
        stored?;

        info!(%video_id, object_key, "raw object stored");
        return Ok(Json(json!({
            "video_id": video_id,
            "object_key": object_key,
        })));
    }

    Err(ApiError::bad_request("missing 'video' field"))
}

async fn stage_and_store(
    state: &AppState,
    field: &mut axum::extract::multipart::Field<'_>,
    scratch: &Path,
    object_key: &str,
) -> Result<(), ApiError> {
    let mut file = tokio::fs::File::create(scratch).await?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    state.storage.upload_file(object_key, scratch).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub(super) struct PreviewRequest {
    pub video_id: String,
    pub object_key: String,
}

/// `POST /preview` — starts a preview render, or answers immediately when
/// the output already exists.
pub(super) async fn preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> Result<Response, ApiError> {
    if !state.storage.exists(&request.object_key).await? {
        return Err(ApiError::not_found("source object not found"));
    }

    let preview_key = format!("previews/{}.mp4", request.video_id);
    if state.storage.exists(&preview_key).await? {
        let record = state
            .registry
            .create_completed(preview_url(&state, &preview_key))
            .await;
        return Ok(Json(record).into_response());
    }

    let job_id = state.registry.create().await;
    tokio::spawn(run_preview_job(
        state.clone(),
        job_id,
        request.object_key,
        preview_key,
    ));

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))).into_response())
}

async fn run_preview_job(
    state: Arc<AppState>,
    job_id: Uuid,
    object_key: String,
    preview_key: String,
) {
    state.registry.mark_running(job_id).await;

    match render_preview(&state, &object_key, &preview_key).await {
        Ok(url) => {
            info!(%job_id, preview_key, "preview rendered");
            state.registry.complete(job_id, url).await;
        }
        Err(err) => {
            error!(%job_id, error = %err, "preview job failed");
            state.registry.fail(job_id, err.to_string()).await;
        }
    }
}

async fn render_preview(
    state: &AppState,
    object_key: &str,
    preview_key: &str,
) -> anyhow::Result<String> {
    let scratch = state.work_root.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&scratch).await?;

    let result = async {
        let filename = object_key.rsplit('/').next().unwrap_or("source.mp4");
        let source = scratch.join(filename);
        let bytes = state.storage.download(object_key).await?;
        tokio::fs::write(&source, &bytes).await?;

        let output = scratch.join("preview.mp4");
        state.processor.preview(&source, &output).await?;

        let rendered = tokio::fs::read(&output).await?;
        state.storage.upload(preview_key, rendered.into()).await?;

        Ok(preview_url(state, preview_key))
    }
    .await;

    if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
        warn!(dir = %scratch.display(), error = %err, "failed to remove scratch dir");
    }

    result
}

/// `GET /status/{job_id}` — preview job state for polling clients.
pub(super) async fn status(
    State(state): State<Arc<AppState>>,
    UrlPath(job_id): UrlPath<Uuid>,
) -> Result<Json<crate::segment::JobRecord>, ApiError> {
    match state.registry.get(job_id).await {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::not_found("unknown job")),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ProcessRequest {
    pub object_key: String,
    #[serde(flatten)]
    pub descriptor: ProcessingDescriptor,
}

/// `POST /process` — accepts the full processing descriptor, responds 202
/// immediately and publishes in the background.
pub(super) async fn process(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> Result<Response, ApiError> {
    if !state.storage.exists(&request.object_key).await? {
        return Err(ApiError::not_found("source object not found"));
    }

    let process_id = Uuid::new_v4();
    tokio::spawn(run_process_job(state.clone(), process_id, request));

    Ok((StatusCode::ACCEPTED, Json(json!({ "process_id": process_id }))).into_response())
}

async fn run_process_job(state: Arc<AppState>, process_id: Uuid, request: ProcessRequest) {
    let descriptor = &request.descriptor;
    let cancel = CancellationToken::new();

    let result = if descriptor.cuts.is_empty() {
        state
            .publisher
            .publish_stored(&request.object_key, descriptor, &cancel)
            .await
    } else {
        state
            .publisher
            .publish_processed(&request.object_key, descriptor, &cancel)
            .await
    };

    match result {
        Ok(record) => {
            info!(%process_id, asset_id = %record.asset_id, "process job published");
        }
        Err(err) => {
            error!(%process_id, error = %err, "process job failed");
            // fire-and-forget job: surface the failure in the catalog row
            if let Err(mark_err) = state
                .catalog
                .mark_error(descriptor.destination_id, descriptor.kind, &err.to_string())
                .await
            {
                error!(%process_id, error = %mark_err, "could not write error marker");
            }
        }
    }
}

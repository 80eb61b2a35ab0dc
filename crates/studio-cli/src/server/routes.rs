//! One handler per pipeline step plus storage and health.
//!
//! Stage work is synchronous, so every handler that reaches a provider hands
//! it to the blocking pool and builds its clients there.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use studio_contracts::pipeline::{
    DatasetItem, MotionOutcome, MotionType, NamedAsset, PipelineStage, DEFAULT_DATASET_COUNT,
};
use studio_contracts::session::{SessionContext, SessionHandle, StorageCredentials};
use studio_engine::stages::{
    run_assembly, run_dataset, run_face, run_motion, run_upscale, AssemblyInput,
    MOTION_INTERNAL_SUGGESTION,
};
use studio_engine::{StageContext, StageError, StageKit, StorageHandoff};
use tracing::{info, warn};

use super::error::ApiError;
use super::schemas::{
    decode_base64, encode_base64, present, AssemblyRequest, AssemblyResponse, BatchResponse,
    DatasetRequest, DownloadEntry, Downloads, FaceRequest, FaceResponse, ImageEntry,
    ImagePayload, ImageSetResponse, ListResponse, ListedEntry, MotionRequest, MotionResponse,
    StorageRequest, StoredEntry, UploadResponse, UpscaleRequest,
};
use super::state::AppState;

const IMAGE_REQUIRED: &str = "API key and image required";
const IMAGES_REQUIRED: &str = "API key and images required";

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn step1_face(
    State(state): State<AppState>,
    payload: Result<Json<FaceRequest>, JsonRejection>,
) -> ApiResult<FaceResponse> {
    let Json(request) = payload?;
    let (session, image) = key_and_image(
        request.api_key.as_deref(),
        request.image_base64.as_deref(),
    )?;
    let model = request.model;
    let output = on_blocking_pool(&state, session, move |ctx| {
        run_face(ctx, &image, model.as_deref())
    })
    .await??;

    Ok(Json(FaceResponse {
        success: true,
        step: PipelineStage::Face.number(),
        image: encode_base64(&output.image),
        model: output.model,
        degraded: output.degraded,
        message: output.message,
        note: output.note,
        suggestion: output.suggestion,
    }))
}

pub async fn step2_dataset(
    State(state): State<AppState>,
    payload: Result<Json<DatasetRequest>, JsonRejection>,
) -> ApiResult<ImageSetResponse> {
    let Json(request) = payload?;
    let (session, image) = key_and_image(
        request.api_key.as_deref(),
        request.image_base64.as_deref(),
    )?;
    let count = request.count.unwrap_or(DEFAULT_DATASET_COUNT);
    let output = on_blocking_pool(&state, session, move |ctx| run_dataset(ctx, &image, count))
        .await??;

    Ok(Json(ImageSetResponse {
        success: true,
        step: PipelineStage::Dataset.number(),
        count: output.items.len(),
        images: entries(&output.items),
        model: output.model,
        degraded: output.degraded,
        message: output.message,
        note: output.note,
        enhanced: None,
    }))
}

pub async fn step3_upscale(
    State(state): State<AppState>,
    payload: Result<Json<UpscaleRequest>, JsonRejection>,
) -> ApiResult<ImageSetResponse> {
    let Json(request) = payload?;
    let Some(key) = present(request.api_key.as_deref()) else {
        return Err(ApiError::bad_request(IMAGES_REQUIRED));
    };
    if request.images.is_empty() {
        return Err(ApiError::bad_request(IMAGES_REQUIRED));
    }
    let session = SessionContext::new(SessionHandle::generate(), key);
    let items = request
        .images
        .into_iter()
        .enumerate()
        .map(|(position, image)| image.into_item(position))
        .collect::<Result<Vec<DatasetItem>, ApiError>>()?;
    let output = on_blocking_pool(&state, session, move |ctx| run_upscale(ctx, items)).await??;

    Ok(Json(ImageSetResponse {
        success: true,
        step: PipelineStage::Upscale.number(),
        count: output.items.len(),
        images: entries(&output.items),
        model: output.model,
        degraded: output.degraded,
        message: output.message,
        note: None,
        enhanced: Some(output.enhanced),
    }))
}

/// A timed-out or empty video job is a normal response with
/// `success: false`; only provider errors become error statuses.
pub async fn step5_motion(
    State(state): State<AppState>,
    payload: Result<Json<MotionRequest>, JsonRejection>,
) -> ApiResult<MotionResponse> {
    let Json(request) = payload?;
    let (session, image) = key_and_image(
        request.api_key.as_deref(),
        request.image_base64.as_deref(),
    )?;
    let motion_type = MotionType::parse_lenient(request.motion_type.as_deref());
    let output = on_blocking_pool(&state, session, move |ctx| {
        run_motion(ctx, &image, motion_type)
    })
    .await?
    .map_err(|err| ApiError::stage_with_suggestion(err, MOTION_INTERNAL_SUGGESTION))?;

    let operation = output.operation().map(str::to_string);
    let (video, mime_type) = match &output.outcome {
        MotionOutcome::Completed { video, mime_type } => {
            (Some(encode_base64(video)), Some(mime_type.clone()))
        }
        _ => (None, None),
    };
    Ok(Json(MotionResponse {
        success: video.is_some(),
        step: PipelineStage::Motion.number(),
        video,
        mime_type,
        model: output.model,
        message: output.message,
        suggestion: output.suggestion,
        operation,
    }))
}

pub async fn step6_assembly(
    payload: Result<Json<AssemblyRequest>, JsonRejection>,
) -> ApiResult<AssemblyResponse> {
    let Json(request) = payload?;
    let images = request
        .images
        .iter()
        .map(|image| decode_base64(image.image(), "images"))
        .collect::<Result<Vec<_>, _>>()?;
    let audio = optional_payload(request.audio_base64.as_deref(), "audioBase64")?;
    let video = optional_payload(request.video_base64.as_deref(), "videoBase64")?;

    let output = run_assembly(AssemblyInput {
        images,
        audio,
        video,
    });
    let bundle = output.bundle;
    let download = |asset: &NamedAsset| DownloadEntry {
        name: asset.name.clone(),
        data: encode_base64(&asset.data),
    };
    Ok(Json(AssemblyResponse {
        success: true,
        step: PipelineStage::Assembly.number(),
        message: output.message,
        assets: bundle.assets,
        instructions: bundle
            .instructions
            .iter()
            .enumerate()
            .map(|(idx, option)| (format!("option{}", idx + 1), option))
            .collect::<BTreeMap<_, _>>(),
        downloads: Downloads {
            images: bundle.downloads.images.iter().map(download).collect(),
            audio: bundle.downloads.audio.as_ref().map(download),
            video: bundle.downloads.video.as_ref().map(download),
        },
    }))
}

pub async fn storage(
    State(state): State<AppState>,
    payload: Result<Json<StorageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let (Some(url), Some(key)) = (
        present(request.supabase_url.as_deref()),
        present(request.supabase_key.as_deref()),
    ) else {
        return Err(ApiError::bad_request("Supabase credentials required"));
    };
    let credentials = StorageCredentials {
        url: url.to_string(),
        key: key.to_string(),
    };
    let session = present(request.session_id.as_deref()).map(session_handle).transpose()?;

    match request.action.as_deref() {
        Some("upload") => {
            let (Some(session), Some(name), Some(raw)) = (
                session,
                present(request.image_name.as_deref()),
                present(request.image_base64.as_deref()),
            ) else {
                return Err(ApiError::bad_request(
                    "Session ID, image name, and image data required",
                ));
            };
            let bytes = decode_base64(raw, "imageBase64")?;
            let name = name.to_string();
            let stored = with_store(&state, credentials, move |handoff| {
                handoff.upload(&session, &name, &bytes)
            })
            .await?;
            info!(path = %stored.path, "stored image");
            Ok(Json(UploadResponse {
                success: true,
                url: stored.url,
                path: stored.path,
            })
            .into_response())
        }
        Some("uploadBatch") => {
            let Some(session) = session.filter(|_| !request.images.is_empty()) else {
                return Err(ApiError::bad_request("Session ID and images required"));
            };
            let items: Vec<DatasetItem> = request
                .images
                .into_iter()
                .enumerate()
                .filter_map(|(position, image)| match storage_item(image, position) {
                    Ok(item) => Some(item),
                    Err(err) => {
                        warn!(position, error = %err, "batch image dropped");
                        None
                    }
                })
                .collect();
            let stored = with_store(&state, credentials, move |handoff| {
                Ok(handoff.upload_batch(&session, &items))
            })
            .await?;
            info!(count = stored.len(), "stored image batch");
            Ok(Json(BatchResponse {
                success: true,
                count: stored.len(),
                images: stored
                    .into_iter()
                    .map(|item| StoredEntry {
                        id: item.id,
                        name: item.name,
                        url: item.url,
                        path: item.path,
                    })
                    .collect(),
            })
            .into_response())
        }
        Some("list") => {
            let Some(session) = session else {
                return Err(ApiError::bad_request("Session ID required"));
            };
            let listed = with_store(&state, credentials, move |handoff| handoff.list(&session))
                .await?;
            Ok(Json(ListResponse {
                success: true,
                images: listed
                    .into_iter()
                    .map(|object| ListedEntry {
                        name: object.name,
                        url: object.url,
                    })
                    .collect(),
            })
            .into_response())
        }
        _ => Err(ApiError::bad_request("Invalid action")),
    }
}

/// Runs `stage` on the blocking pool with freshly built clients. The outer
/// error is a task failure; the inner one is the stage's own.
async fn on_blocking_pool<T, F>(
    state: &AppState,
    session: SessionContext,
    stage: F,
) -> Result<Result<T, StageError>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&StageContext<'_>) -> Result<T, StageError> + Send + 'static,
{
    let backends = Arc::clone(&state.backends);
    let outcome = tokio::task::spawn_blocking(move || {
        let kit = StageKit::new(backends.as_ref());
        stage(&kit.context(&session, None))
    })
    .await?;
    Ok(outcome)
}

async fn with_store<T, F>(
    state: &AppState,
    credentials: StorageCredentials,
    action: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&StorageHandoff<'_>) -> anyhow::Result<T> + Send + 'static,
{
    let backends = Arc::clone(&state.backends);
    let result = tokio::task::spawn_blocking(move || {
        let store = backends.object_store(&credentials)?;
        action(&StorageHandoff::new(store.as_ref()))
    })
    .await?;
    Ok(result?)
}

fn key_and_image(
    api_key: Option<&str>,
    image: Option<&str>,
) -> Result<(SessionContext, Vec<u8>), ApiError> {
    let (Some(key), Some(raw)) = (present(api_key), present(image)) else {
        return Err(ApiError::bad_request(IMAGE_REQUIRED));
    };
    let bytes = decode_base64(raw, "imageBase64")?;
    Ok((SessionContext::new(SessionHandle::generate(), key), bytes))
}

fn session_handle(raw: &str) -> Result<SessionHandle, ApiError> {
    SessionHandle::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid session ID"))
}

fn optional_payload(raw: Option<&str>, field: &str) -> Result<Option<Vec<u8>>, ApiError> {
    present(raw).map(|raw| decode_base64(raw, field)).transpose()
}

/// Batch uploads name unnamed images after their id.
fn storage_item(image: ImagePayload, position: usize) -> Result<DatasetItem, ApiError> {
    let named = matches!(
        &image,
        ImagePayload::Entry { name: Some(name), .. } if !name.trim().is_empty()
    );
    let mut item = image.into_item(position)?;
    if !named {
        item.label = item.id.to_string();
    }
    Ok(item)
}

fn entries(items: &[DatasetItem]) -> Vec<ImageEntry> {
    items.iter().map(ImageEntry::from).collect()
}

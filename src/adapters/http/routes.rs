use std::collections::HashMap;
use std::path::Path;

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::error::ApiResult;
use crate::adapters::http::state::HttpState;
use crate::application::dto::{
    CamerasResponse, ConfigResponse, ImageDetectionResponse, LoadModelRequest, ModelConfigRequest, OkResponse,
    StartStreamRequest,
};
use crate::application::services::{ImagePreview, ImageUpload, ModelInfo};
use crate::domain::{
    display::DisplayOptions,
    errors::DomainError,
    model::{ModelId, ModelTask, YoloParams},
    source::{SourceKind, StreamSource},
};

pub async fn get_config(State(st): State<HttpState>) -> impl IntoResponse {
    Json(ConfigResponse {
        tasks: ModelTask::ALL.to_vec(),
        sources: SourceKind::ALL.to_vec(),
        videos: st.videos.list(),
        webcam_index: st.webcam_index,
        confidence_min: 25,
        confidence_max: 100,
        defaults: ModelConfigRequest::default(),
    })
}

pub async fn list_sources(State(st): State<HttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "sources": SourceKind::ALL,
        "videos": st.videos.list(),
    }))
}

pub async fn list_cameras(State(st): State<HttpState>) -> ApiResult<Json<CamerasResponse>> {
    let cameras = st.camera.list_cameras().await?;
    Ok(Json(CamerasResponse { cameras }))
}

/// Campos de texto y fichero de un formulario multipart.
struct Form {
    fields: HashMap<String, String>,
    file: Option<ImageUpload>,
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> ApiResult<Form> {
    let mut form = Form { fields: HashMap::new(), file: None };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::InvalidInput(format!("multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| DomainError::InvalidInput(format!("multipart: {e}")))?;
            if !bytes.is_empty() {
                form.file = Some(ImageUpload { file_name, bytes: bytes.to_vec() });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| DomainError::InvalidInput(format!("multipart: {e}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

impl Form {
    fn flag(&self, key: &str, default: bool) -> bool {
        self.fields.get(key).map(|v| matches!(v.as_str(), "true" | "on" | "1")).unwrap_or(default)
    }

    fn number(&self, key: &str, default: u32) -> Result<u32, DomainError> {
        match self.fields.get(key) {
            Some(v) => v.trim().parse().map_err(|_| DomainError::InvalidInput(format!("{key} must be a number"))),
            None => Ok(default),
        }
    }

    fn model_config(&self) -> Result<ModelConfigRequest, DomainError> {
        let defaults = ModelConfigRequest::default();
        Ok(ModelConfigRequest {
            task: self.fields.get("task").cloned().unwrap_or(defaults.task),
            confidence: self.number("confidence", defaults.confidence)?,
            image_size: self.number("image_size", defaults.image_size)?,
            display: DisplayOptions {
                show_labels: self.flag("show_labels", true),
                show_conf: self.flag("show_conf", true),
                show_boxes: self.flag("show_boxes", true),
                show_masks: self.flag("show_masks", true),
            },
        })
    }
}

pub async fn upload_weights(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<Json<ModelId>> {
    let form = read_form(multipart, "weights").await?;
    let upload = form.file.ok_or_else(|| DomainError::InvalidInput("Choose a weight file to upload".into()))?;
    if !upload.file_name.to_ascii_lowercase().ends_with(".onnx") {
        return Err(DomainError::InvalidInput(format!("weights must be an .onnx file, got {}", upload.file_name)).into());
    }
    Ok(Json(st.models.store_custom_weights(&upload.bytes).await?))
}

pub async fn load_model(State(st): State<HttpState>, Json(req): Json<LoadModelRequest>) -> ApiResult<Json<ModelInfo>> {
    let task = ModelTask::parse(&req.task)?;
    Ok(Json(st.models.load(task).await?))
}

pub async fn detect_image(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<Json<ImageDetectionResponse>> {
    let form = read_form(multipart, "image").await?;
    let (task, params, display) = form.model_config()?.parse()?;
    let upload = form.file.ok_or_else(|| DomainError::InvalidInput("No image is uploaded yet!".into()))?;
    let detection = st.images.detect(upload, task, params, display).await?;
    Ok(Json(detection.into()))
}

pub async fn preview_image(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<Json<ImagePreview>> {
    let form = read_form(multipart, "image").await?;
    Ok(Json(st.images.preview(form.file.as_ref())?))
}

pub async fn download_result(State(st): State<HttpState>) -> ApiResult<Response> {
    let (bytes, name) = st.images.last_result().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{name}\"")),
        ],
        bytes,
    )
        .into_response())
}

async fn serve_image(path: &Path) -> ApiResult<Response> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DomainError::NotFound(format!("{}: {e}", path.display())))?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    };
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

pub async fn default_image(State(st): State<HttpState>) -> ApiResult<Response> {
    serve_image(&st.images.paths().default_image).await
}

pub async fn default_detected_image(State(st): State<HttpState>) -> ApiResult<Response> {
    serve_image(&st.images.paths().default_detected_image).await
}

pub async fn start_stream(State(st): State<HttpState>, Json(mut req): Json<StartStreamRequest>) -> ApiResult<Json<OkResponse>> {
    // Los vídeos se eligen por nombre dentro de la biblioteca, no por ruta libre.
    match SourceKind::parse(&req.source)? {
        SourceKind::Video => req.value = st.videos.resolve(req.value.trim())?,
        SourceKind::Webcam if req.value.trim().is_empty() => req.value = st.webcam_index.to_string(),
        _ => {}
    }
    let (source, task, params, display) =
        <(StreamSource, ModelTask, YoloParams, DisplayOptions)>::try_from(req)?;
    st.pipeline.start(source, task, params, display).await?;
    Ok(Json(OkResponse { ok: true }))
}

pub async fn stop_stream(State(st): State<HttpState>) -> ApiResult<Json<OkResponse>> {
    st.pipeline.stop().await?;
    Ok(Json(OkResponse { ok: true }))
}

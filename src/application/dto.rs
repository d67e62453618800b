use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::application::services::ImageDetection;
use crate::domain::{
    camera::CameraInfo,
    detection::Detection,
    display::DisplayOptions,
    errors::{DomainError, DomainResult},
    model::{ModelTask, YoloParams},
    source::{SourceKind, StreamSource},
};

fn default_task() -> String { "Detection".into() }
fn default_confidence() -> u32 { 40 }
fn default_image_size() -> u32 { 640 }

/// Valores del bloque "ML Model Config" de la barra lateral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfigRequest {
    #[serde(default = "default_task")]
    pub task: String,
    /// Porcentaje del slider (25..=100).
    #[serde(default = "default_confidence")]
    pub confidence: u32,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default)]
    pub display: DisplayOptions,
}

impl Default for ModelConfigRequest {
    fn default() -> Self {
        Self {
            task: default_task(),
            confidence: default_confidence(),
            image_size: default_image_size(),
            display: DisplayOptions::default(),
        }
    }
}

impl ModelConfigRequest {
    pub fn parse(&self) -> DomainResult<(ModelTask, YoloParams, DisplayOptions)> {
        let task = ModelTask::parse(&self.task)?;
        let params = YoloParams::from_slider(self.confidence, self.image_size)?;
        Ok((task, params, self.display))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartStreamRequest {
    /// Etiqueta de la fuente: "Video", "Webcam", "RTSP" o "YouTube".
    #[serde(default)]
    pub source: String,
    /// Ruta del vídeo, índice de cámara o URL.
    #[serde(default)]
    pub value: String,
    #[serde(flatten)]
    pub model: ModelConfigRequest,
}

impl TryFrom<StartStreamRequest> for (StreamSource, ModelTask, YoloParams, DisplayOptions) {
    type Error = DomainError;

    fn try_from(r: StartStreamRequest) -> Result<Self, Self::Error> {
        let kind = SourceKind::parse(&r.source)?;
        let source = StreamSource::from_selection(kind, &r.value)?;
        let (task, params, display) = r.model.parse()?;
        Ok((source, task, params, display))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadModelRequest {
    #[serde(default = "default_task")]
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDetectionResponse {
    pub width: u32,
    pub height: u32,
    pub infer_ms: f32,
    pub summary: String,
    pub image_jpeg_base64: String,
    pub download_name: String,
    pub detections: Vec<Detection>,
    /// Filas crudas `[x1, y1, x2, y2, score, class]` por caja.
    pub boxes: Vec<[f32; 6]>,
}

impl From<ImageDetection> for ImageDetectionResponse {
    fn from(d: ImageDetection) -> Self {
        Self {
            width: d.width,
            height: d.height,
            infer_ms: d.infer_ms,
            summary: d.summary,
            image_jpeg_base64: BASE64_STANDARD.encode(&d.jpeg),
            download_name: d.download_name,
            boxes: d.detections.iter().map(Detection::as_row).collect(),
            detections: d.detections,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub tasks: Vec<ModelTask>,
    pub sources: Vec<SourceKind>,
    pub videos: Vec<String>,
    pub webcam_index: u32,
    pub confidence_min: u32,
    pub confidence_max: u32,
    pub defaults: ModelConfigRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamerasResponse {
    pub cameras: Vec<CameraInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

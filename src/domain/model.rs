use serde::{Deserialize, Serialize};
use tracing::warn;

use super::errors::{DomainError, DomainResult};

/// Tarea seleccionada en la barra lateral.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Detection,
    Segmentation,
    CustomModel,
}

impl ModelTask {
    pub const ALL: [ModelTask; 3] = [ModelTask::Detection, ModelTask::Segmentation, ModelTask::CustomModel];

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw.trim() {
            "Detection" => Ok(ModelTask::Detection),
            "Segmentation" => Ok(ModelTask::Segmentation),
            "CustomModel" => Ok(ModelTask::CustomModel),
            other => Err(DomainError::InvalidInput(format!("unknown task: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelId {
    pub name: String,       // logical name, e.g. "yolov8n"
    pub onnx_path: String,  // filesystem path
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YoloParams {
    pub input_size: u32,        // 640 typical
    pub conf_threshold: f32,    // 0..1
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,  // e.g. 300
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.40,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Paso máximo de las cabezas YOLOv8: el tamaño de entrada debe ser múltiplo de él.
pub const MODEL_STRIDE: u32 = 32;

impl YoloParams {
    /// Construye los parámetros a partir del slider de confianza (25..=100 %).
    pub fn from_slider(confidence_pct: u32, input_size: u32) -> DomainResult<Self> {
        if !(25..=100).contains(&confidence_pct) {
            return Err(DomainError::InvalidInput(format!(
                "confidence must be within 25..=100, got {confidence_pct}"
            )));
        }
        if input_size == 0 {
            return Err(DomainError::InvalidInput("image size must be positive".into()));
        }
        let aligned = input_size.div_ceil(MODEL_STRIDE) * MODEL_STRIDE;
        if aligned != input_size {
            warn!("imgsz={} no es múltiplo de {}, se usa {}", input_size, MODEL_STRIDE, aligned);
        }
        Ok(Self {
            input_size: aligned,
            conf_threshold: confidence_pct as f32 / 100.0,
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub model: ModelId,
    pub params: YoloParams,
}

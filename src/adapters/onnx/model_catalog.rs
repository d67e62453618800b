use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::application::ports::ModelCatalogPort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{ModelId, ModelTask};

pub const DETECTION_MODEL: &str = "yolov8n.onnx";
pub const SEGMENTATION_MODEL: &str = "yolov8n-seg.onnx";
pub const CUSTOM_MODEL: &str = "yolov8-custom.onnx";

/// Catálogo de pesos ONNX dentro de un directorio local.
pub struct OnnxModelCatalog {
    weights_dir: PathBuf,
}

impl OnnxModelCatalog {
    pub fn new(weights_dir: impl Into<PathBuf>) -> Self {
        Self { weights_dir: weights_dir.into() }
    }
}

#[async_trait]
impl ModelCatalogPort for OnnxModelCatalog {
    fn resolve(&self, task: ModelTask) -> ModelId {
        let file = match task {
            ModelTask::Detection => DETECTION_MODEL,
            ModelTask::Segmentation => SEGMENTATION_MODEL,
            ModelTask::CustomModel => CUSTOM_MODEL,
        };
        ModelId {
            name: file.trim_end_matches(".onnx").to_string(),
            onnx_path: self.weights_dir.join(file).to_string_lossy().into_owned(),
        }
    }

    async fn store_custom_weights(&self, bytes: &[u8]) -> DomainResult<ModelId> {
        if bytes.is_empty() {
            return Err(DomainError::InvalidInput("uploaded weights are empty".into()));
        }
        let model = self.resolve(ModelTask::CustomModel);
        tokio::fs::create_dir_all(&self.weights_dir)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("{}: {e}", self.weights_dir.display())))?;
        tokio::fs::write(&model.onnx_path, bytes)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("{}: {e}", model.onnx_path)))?;
        Ok(model)
    }

    async fn validate_model(&self, model: &ModelId) -> DomainResult<()> {
        if model.onnx_path.trim().is_empty() {
            return Err(DomainError::InvalidInput("onnx_path empty".into()));
        }
        if !Path::new(&model.onnx_path).exists() {
            return Err(DomainError::NotFound(format!("model file not found: {}", model.onnx_path)));
        }
        Ok(())
    }
}

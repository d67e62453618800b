use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::broadcast;

use crate::domain::{
    camera::CameraInfo,
    detection::DetectionResult,
    display::DisplayOptions,
    errors::DomainResult,
    model::{InferenceConfig, ModelId, ModelTask, YoloParams},
    source::StreamSource,
    stream::StreamEvent,
};

#[async_trait]
pub trait CameraCatalogPort: Send + Sync {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>>;
}

#[async_trait]
pub trait ModelCatalogPort: Send + Sync {
    /// Ruta de pesos asociada a cada tarea.
    fn resolve(&self, task: ModelTask) -> ModelId;
    /// Guarda tal cual los pesos subidos por el usuario y devuelve su identificador.
    async fn store_custom_weights(&self, bytes: &[u8]) -> DomainResult<ModelId>;
    async fn validate_model(&self, model: &ModelId) -> DomainResult<()>;
}

/// Modelo cargado listo para inferir. Se usa desde hilos bloqueantes.
pub trait Detector: Send {
    fn detect(&mut self, image: &RgbImage, params: &YoloParams) -> DomainResult<DetectionResult>;
    fn class_names(&self) -> &[String];
}

pub trait DetectorFactoryPort: Send + Sync {
    fn load(&self, model: &ModelId) -> DomainResult<Box<dyn Detector>>;
}

pub trait AnnotatorPort: Send + Sync {
    fn annotate(&self, image: &RgbImage, result: &DetectionResult, display: &DisplayOptions) -> RgbImage;
}

/// Fuente de frames abierta. `Ok(None)` indica que la fuente se agotó.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>>;
}

pub trait FrameSourceFactoryPort: Send + Sync {
    fn open(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSource>>;
}

pub trait StreamUrlResolverPort: Send + Sync {
    fn resolve(&self, page_url: &str) -> DomainResult<String>;
}

/// Configuración completa de una sesión de streaming.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub source: StreamSource,
    pub infer: InferenceConfig,
    pub display: DisplayOptions,
    /// Cambia cada vez que se sube un peso personalizado, fuerza la recarga.
    pub revision: u64,
}

#[async_trait]
pub trait StreamPort: Send + Sync {
    async fn configure(&self, config: StreamConfig) -> DomainResult<()>;
    async fn stop(&self) -> DomainResult<()>;
    async fn subscribe(&self) -> DomainResult<broadcast::Receiver<StreamEvent>>;
}

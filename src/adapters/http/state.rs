use std::sync::Arc;

use crate::adapters::files::video_library::VideoLibrary;
use crate::application::services::{CameraService, ImageService, ModelService, PipelineService};

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    pub models: Arc<ModelService>,
    /// Rama de imagen: detección puntual y descarga del resultado.
    pub images: Arc<ImageService>,
    /// Ramas continuas: vídeo, webcam, RTSP y YouTube.
    pub pipeline: Arc<PipelineService>,
    pub camera: Arc<CameraService>,
    pub videos: Arc<VideoLibrary>,
    pub webcam_index: u32,
}

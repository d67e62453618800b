mod adapters;
mod application;
mod config;
mod domain;

use std::sync::Arc;

use clap::Parser;
use tower_http::services::ServeDir;

use crate::adapters::{
    files::video_library::VideoLibrary,
    http::{router, state::HttpState},
    onnx::{model_catalog::OnnxModelCatalog, yolo_engine::OnnxDetectorFactory},
    render::draw::Draw,
    stream::{pipeline::PipelineAdapter, sources::MediaSourceFactory},
    youtube::resolver::YtDlpResolver,
};
use crate::application::ports::CameraCatalogPort;
use crate::application::services::{CameraService, ImagePaths, ImageService, ModelService, PipelineService};
use crate::config::Settings;

#[cfg(feature = "v4l2")]
fn camera_catalog() -> Arc<dyn CameraCatalogPort> {
    Arc::new(adapters::v4l2::camera_repo::V4l2CameraCatalog::new())
}

#[cfg(not(feature = "v4l2"))]
fn camera_catalog() -> Arc<dyn CameraCatalogPort> {
    struct NoCameras;

    #[async_trait::async_trait]
    impl CameraCatalogPort for NoCameras {
        async fn list_cameras(&self) -> domain::errors::DomainResult<Vec<domain::camera::CameraInfo>> {
            Ok(Vec::new())
        }
    }

    Arc::new(NoCameras)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Inicializar logs (RUST_LOG=info por defecto)
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let settings = Settings::parse();
    tracing::debug!("Configuración: {:?}", settings);
    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 2. Adaptadores
    let annotator = Arc::new(match &settings.font_path {
        Some(path) => Draw::with_font_path(path)?,
        None => Draw::new()?,
    });
    let detectors = Arc::new(OnnxDetectorFactory::new(settings.intra_threads));
    let model_cat = Arc::new(OnnxModelCatalog::new(&settings.weights_dir));
    let resolver = Arc::new(YtDlpResolver::new(settings.ytdlp.clone()));
    let sources = Arc::new(MediaSourceFactory::new(resolver));
    let pipeline_adapter = Arc::new(PipelineAdapter::new(sources, detectors.clone(), annotator.clone()));

    // 3. Servicios (casos de uso)
    let model_service = Arc::new(ModelService::new(model_cat, detectors));
    let image_service = Arc::new(ImageService::new(
        model_service.clone(),
        annotator,
        ImagePaths {
            default_image: settings.default_image.clone(),
            default_detected_image: settings.default_detected_image.clone(),
            download_path: settings.download_path.clone(),
        },
    ));
    let pipeline_service = Arc::new(PipelineService::new(pipeline_adapter, model_service.clone()));
    let camera_service = Arc::new(CameraService::new(camera_catalog()));

    // 4. Estado de la API
    let state = HttpState {
        models: model_service,
        images: image_service,
        pipeline: pipeline_service,
        camera: camera_service,
        videos: Arc::new(VideoLibrary::new(&settings.videos_dir)),
        webcam_index: settings.webcam_index,
    };

    // 5. Router de Axum y archivos estáticos
    let app = router(state).fallback_service(ServeDir::new(&settings.static_dir));

    // 6. Lanzar el servidor
    tracing::info!("🚀 Servidor YOLO iniciado en http://{}", settings.bind);
    tracing::info!("📂 Archivos estáticos servidos desde '{}'", settings.static_dir.display());
    tracing::info!("🧠 Pesos ONNX en '{}'", settings.weights_dir.display());

    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

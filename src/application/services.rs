use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::RgbImage;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    application::ports::{
        AnnotatorPort, CameraCatalogPort, Detector, DetectorFactoryPort, ModelCatalogPort, StreamConfig,
        StreamPort,
    },
    domain::{
        camera::CameraInfo,
        detection::{summarize_detections, Detection},
        display::DisplayOptions,
        errors::{DomainError, DomainResult},
        model::{InferenceConfig, ModelId, ModelTask, YoloParams},
        source::StreamSource,
        stream::StreamEvent,
    },
};

/// Servicio encargado de la gestión de dispositivos físicos de captura.
#[derive(Clone)]
pub struct CameraService {
    catalog: Arc<dyn CameraCatalogPort>,
}

impl CameraService {
    pub fn new(catalog: Arc<dyn CameraCatalogPort>) -> Self {
        Self { catalog }
    }

    pub async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        self.catalog.list_cameras().await
    }
}

struct LoadedModel {
    key: String,
    detector: Box<dyn Detector>,
}

/// Información del modelo activo que se devuelve a la interfaz.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelInfo {
    pub task: ModelTask,
    pub model: ModelId,
    pub classes: Vec<String>,
}

/// Resolución de pesos por tarea, subida de pesos personalizados y carga del detector.
///
/// El detector cargado se reutiliza mientras la ruta y la revisión de pesos no cambien.
pub struct ModelService {
    catalog: Arc<dyn ModelCatalogPort>,
    factory: Arc<dyn DetectorFactoryPort>,
    loaded: Arc<Mutex<Option<LoadedModel>>>,
    revision: AtomicU64,
}

impl ModelService {
    pub fn new(catalog: Arc<dyn ModelCatalogPort>, factory: Arc<dyn DetectorFactoryPort>) -> Self {
        Self {
            catalog,
            factory,
            loaded: Arc::new(Mutex::new(None)),
            revision: AtomicU64::new(0),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn resolve(&self, task: ModelTask) -> ModelId {
        self.catalog.resolve(task)
    }

    /// Resuelve la ruta de la tarea y comprueba que el fichero exista.
    pub async fn resolve_validated(&self, task: ModelTask) -> DomainResult<ModelId> {
        let model = self.resolve(task);
        self.catalog
            .validate_model(&model)
            .await
            .map_err(|e| DomainError::ModelLoad { path: model.onnx_path.clone(), detail: e.detail() })?;
        Ok(model)
    }

    pub async fn store_custom_weights(&self, bytes: &[u8]) -> DomainResult<ModelId> {
        let model = self.catalog.store_custom_weights(bytes).await?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        info!("Pesos personalizados guardados en {} ({} bytes)", model.onnx_path, bytes.len());
        Ok(model)
    }

    /// Carga (o reutiliza) el detector de la tarea y ejecuta `f` en un hilo bloqueante.
    pub async fn with_detector<F, R>(&self, task: ModelTask, f: F) -> DomainResult<R>
    where
        F: FnOnce(&mut dyn Detector) -> DomainResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let model = self.resolve_validated(task).await?;
        let key = format!("{}#{}", model.onnx_path, self.revision());
        let loaded = self.loaded.clone();
        let factory = self.factory.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| DomainError::OperationFailed("Lock del modelo fallido".into()))?;

            if guard.as_ref().map(|l| l.key.as_str()) != Some(key.as_str()) {
                info!("Cargando modelo {} ({})", model.name, model.onnx_path);
                let detector = factory
                    .load(&model)
                    .map_err(|e| DomainError::ModelLoad { path: model.onnx_path.clone(), detail: e.detail() })?;
                *guard = Some(LoadedModel { key, detector });
            }

            match guard.as_mut() {
                Some(l) => f(l.detector.as_mut()),
                None => Err(DomainError::OperationFailed("modelo no cargado".into())),
            }
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("tarea de inferencia abortada: {e}")))?
    }

    pub async fn load(&self, task: ModelTask) -> DomainResult<ModelInfo> {
        let model = self.resolve(task);
        let classes = self.with_detector(task, |d| Ok(d.class_names().to_vec())).await?;
        Ok(ModelInfo { task, model, classes })
    }
}

/// Rutas que usa la rama de imagen.
#[derive(Debug, Clone)]
pub struct ImagePaths {
    pub default_image: PathBuf,
    pub default_detected_image: PathBuf,
    pub download_path: PathBuf,
}

/// Imagen subida por el usuario.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Nombre base sin extensión, usado para el fichero descargable.
    pub fn stem(&self) -> String {
        self.file_name.split('.').next().filter(|s| !s.is_empty()).unwrap_or("image").to_string()
    }
}

/// Lo que muestra la columna izquierda antes de detectar.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImagePreview {
    /// Sin subida: imagen por defecto y su versión detectada.
    Default,
    Uploaded { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
pub struct ImageDetection {
    pub width: u32,
    pub height: u32,
    pub infer_ms: f32,
    pub jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
    pub summary: String,
    pub download_name: String,
}

/// Rama de imagen: decodifica, infiere una vez, anota y guarda el resultado descargable.
pub struct ImageService {
    models: Arc<ModelService>,
    annotator: Arc<dyn AnnotatorPort>,
    paths: ImagePaths,
    /// Nombre del fichero en `download_path`; su lock cubre también la escritura.
    last_name: tokio::sync::Mutex<Option<String>>,
}

impl ImageService {
    pub fn new(models: Arc<ModelService>, annotator: Arc<dyn AnnotatorPort>, paths: ImagePaths) -> Self {
        Self { models, annotator, paths, last_name: tokio::sync::Mutex::new(None) }
    }

    pub fn paths(&self) -> &ImagePaths {
        &self.paths
    }

    pub fn decode(bytes: &[u8]) -> DomainResult<RgbImage> {
        if bytes.is_empty() {
            return Err(DomainError::Decode("empty upload".into()));
        }
        image::load_from_memory(bytes)
            .map(|img| img.to_rgb8())
            .map_err(|e| DomainError::Decode(e.to_string()))
    }

    /// Comprueba que la subida se puede abrir; sin subida se usan las imágenes por defecto.
    pub fn preview(&self, upload: Option<&ImageUpload>) -> DomainResult<ImagePreview> {
        match upload {
            None => Ok(ImagePreview::Default),
            Some(upload) => {
                let rgb = Self::decode(&upload.bytes)?;
                Ok(ImagePreview::Uploaded { width: rgb.width(), height: rgb.height() })
            }
        }
    }

    pub async fn detect(
        &self,
        upload: ImageUpload,
        task: ModelTask,
        params: YoloParams,
        display: DisplayOptions,
    ) -> DomainResult<ImageDetection> {
        let rgb = Self::decode(&upload.bytes)?;
        let (width, height) = rgb.dimensions();
        let annotator = self.annotator.clone();

        let (result, annotated, infer_ms) = self
            .models
            .with_detector(task, move |detector| {
                let t0 = Instant::now();
                let result = detector.detect(&rgb, &params)?;
                let infer_ms = t0.elapsed().as_secs_f32() * 1000.0;
                let annotated = annotator.annotate(&rgb, &result, &display);
                Ok((result, annotated, infer_ms))
            })
            .await?;

        let jpeg = encode_jpeg(&annotated, 90)?;
        let download_name = format!("{}_detect.jpg", upload.stem());
        {
            let mut last = self.last_name.lock().await;
            tokio::fs::write(&self.paths.download_path, &jpeg)
                .await
                .map_err(|e| DomainError::OperationFailed(format!("no se pudo guardar {}: {e}", self.paths.download_path.display())))?;
            *last = Some(download_name.clone());
        }

        info!(
            "Imagen {} procesada: {}x{} en {:.1} ms ({})",
            upload.file_name,
            width,
            height,
            infer_ms,
            summarize_detections(&result.detections)
        );

        Ok(ImageDetection {
            width,
            height,
            infer_ms,
            jpeg,
            summary: summarize_detections(&result.detections),
            detections: result.detections,
            download_name,
        })
    }

    /// Último resultado guardado junto con el nombre de descarga.
    pub async fn last_result(&self) -> DomainResult<(Vec<u8>, String)> {
        let last = self.last_name.lock().await;
        let name = last
            .clone()
            .ok_or_else(|| DomainError::NotFound("No image is uploaded yet!".into()))?;
        let bytes = tokio::fs::read(&self.paths.download_path)
            .await
            .map_err(|e| DomainError::NotFound(format!("{}: {e}", self.paths.download_path.display())))?;
        Ok((bytes, name))
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    enc.encode(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| DomainError::OperationFailed(format!("error codificando JPEG: {e}")))?;
    Ok(jpeg)
}

/// Orquestador del pipeline (fuente + inferencia) para vídeo, webcam, RTSP y YouTube.
#[derive(Clone)]
pub struct PipelineService {
    stream: Arc<dyn StreamPort>,
    models: Arc<ModelService>,
}

impl PipelineService {
    pub fn new(stream: Arc<dyn StreamPort>, models: Arc<ModelService>) -> Self {
        Self { stream, models }
    }

    /// Configura el pipeline completo.
    /// Antes de aplicar la configuración, valida que el modelo seleccionado exista.
    pub async fn start(
        &self,
        source: StreamSource,
        task: ModelTask,
        params: YoloParams,
        display: DisplayOptions,
    ) -> DomainResult<()> {
        let model = self.models.resolve_validated(task).await?;
        info!("Pipeline: iniciando {} con {}", source.describe(), model.onnx_path);

        self.stream
            .configure(StreamConfig {
                source,
                infer: InferenceConfig { model, params },
                display,
                revision: self.models.revision(),
            })
            .await
    }

    pub async fn stop(&self) -> DomainResult<()> {
        self.stream.stop().await.inspect_err(|e| warn!("Pipeline: error al detener: {e}"))
    }

    /// Receptor del canal de difusión donde se publican frames y eventos.
    pub async fn subscribe(&self) -> DomainResult<broadcast::Receiver<StreamEvent>> {
        self.stream.subscribe().await
    }
}

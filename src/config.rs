use std::path::PathBuf;

use clap::Parser;

/// Configuración del servidor. Cada opción admite también su variable de entorno.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Panel web de detección y segmentación YOLOv8", long_about = None)]
pub struct Settings {
    /// Dirección de escucha del servidor HTTP
    #[arg(long, env = "YOLO_STUDIO_BIND", default_value = "0.0.0.0:8090")]
    pub bind: String,

    /// Carpeta con la interfaz web (index.html, app.js)
    #[arg(long, env = "YOLO_STUDIO_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Carpeta de pesos ONNX (yolov8n.onnx, yolov8n-seg.onnx, yolov8-custom.onnx)
    #[arg(long, env = "YOLO_STUDIO_WEIGHTS_DIR", default_value = "weights")]
    pub weights_dir: PathBuf,

    /// Imagen mostrada antes de subir ninguna
    #[arg(long, env = "YOLO_STUDIO_DEFAULT_IMAGE", default_value = "images/office_4.jpg")]
    pub default_image: PathBuf,

    /// Versión detectada de la imagen por defecto
    #[arg(long, env = "YOLO_STUDIO_DEFAULT_DETECTED_IMAGE", default_value = "images/office_4_detected.jpg")]
    pub default_detected_image: PathBuf,

    /// Carpeta de vídeos almacenados
    #[arg(long, env = "YOLO_STUDIO_VIDEOS_DIR", default_value = "videos")]
    pub videos_dir: PathBuf,

    /// Fichero donde se guarda la última imagen anotada
    #[arg(long, env = "YOLO_STUDIO_DOWNLOAD_PATH", default_value = "res.jpg")]
    pub download_path: PathBuf,

    /// Fuente TTF para las etiquetas en lugar de la DejaVu Sans embebida
    #[arg(long, env = "YOLO_STUDIO_FONT", value_name = "FILE")]
    pub font_path: Option<PathBuf>,

    /// Índice de webcam por defecto (/dev/videoN)
    #[arg(long, env = "YOLO_STUDIO_WEBCAM", default_value = "0")]
    pub webcam_index: u32,

    /// Hilos intra-op de ONNX Runtime
    #[arg(long, env = "YOLO_STUDIO_INTRA_THREADS", default_value = "4")]
    pub intra_threads: usize,

    /// Ejecutable de yt-dlp para resolver URLs de YouTube
    #[arg(long, env = "YOLO_STUDIO_YTDLP", default_value = "yt-dlp")]
    pub ytdlp: String,
}

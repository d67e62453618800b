use anyhow::{anyhow, bail, Result};
use image::{ImageFormat, RgbImage};
use tracing::info;
use v4l::buffer::Type;
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::FrameSource;
use crate::domain::errors::{DomainError, DomainResult};

const MMAP_BUFFERS: u32 = 4;

/// Modo solicitado al driver; puede ajustarlo al más cercano soportado.
pub struct CaptureConfig {
    pub camera_path: String,
    pub fourcc: [u8; 4],
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureConfig {
    /// Modo por defecto de la webcam: MJPG 640x480 a 30 FPS.
    pub fn webcam(camera_path: String) -> Self {
        Self { camera_path, fourcc: *b"MJPG", width: 640, height: 480, fps: 30 }
    }
}

/// Formatos de píxel que sabemos convertir a RGB.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PixelFormat {
    Mjpg,
    Yuyv,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Result<Self> {
        match &fourcc.repr {
            b"MJPG" => Ok(Self::Mjpg),
            b"YUYV" => Ok(Self::Yuyv),
            other => bail!("formato {} no soportado", String::from_utf8_lossy(other)),
        }
    }
}

/// Webcam V4L2 leída con buffers MMAP.
pub struct V4l2Capture {
    stream: Stream<'static>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl V4l2Capture {
    pub fn open(cfg: &CaptureConfig) -> Result<Self> {
        let dev = Device::with_path(&cfg.camera_path)?;

        let mut fmt = dev.format()?;
        fmt.fourcc = FourCC::new(&cfg.fourcc);
        fmt.width = cfg.width;
        fmt.height = cfg.height;
        let applied = dev.set_format(&fmt)?;
        let format = PixelFormat::from_fourcc(applied.fourcc)?;

        // El intervalo de frames es orientativo: algunos drivers no lo admiten.
        if let Ok(mut params) = dev.params() {
            params.interval.numerator = 1;
            params.interval.denominator = cfg.fps;
            let _ = dev.set_params(&params);
        }

        let stream = Stream::with_buffers(&dev, Type::VideoCapture, MMAP_BUFFERS)?;
        info!(
            "Webcam {} abierta: {}x{} {:?} @ {} FPS",
            cfg.camera_path, applied.width, applied.height, format, cfg.fps
        );

        Ok(Self { stream, format, width: applied.width, height: applied.height })
    }

    pub fn next_rgb(&mut self) -> Result<RgbImage> {
        let (data, _) = self.stream.next()?;
        match self.format {
            PixelFormat::Mjpg => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
            PixelFormat::Yuyv => yuyv_to_rgb(data, self.width, self.height)
                .ok_or_else(|| anyhow!("buffer YUYV vacío ({}x{})", self.width, self.height)),
        }
    }
}

impl FrameSource for V4l2Capture {
    /// Una webcam nunca se agota: solo termina con `stop` o con un error de lectura.
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        self.next_rgb()
            .map(Some)
            .map_err(|e| DomainError::OperationFailed(format!("error capturando frame: {e}")))
    }
}

/// BT.601 de rango completo.
fn yuv_pixel(y: u8, u: f32, v: f32) -> [u8; 3] {
    let y = y as f32;
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// YUYV (4:2:2, `[Y0 U Y1 V]` por pareja de píxeles) a RGB.
/// Un buffer corto deja en negro los píxeles que faltan.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    if width == 0 || height == 0 {
        return None;
    }
    let pixels = (width * height) as usize;
    let mut raw = vec![0u8; pixels * 3];

    for (pair, chunk) in yuyv.chunks_exact(4).enumerate() {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for (offset, y) in [chunk[0], chunk[2]].into_iter().enumerate() {
            let idx = pair * 2 + offset;
            if idx >= pixels {
                break;
            }
            raw[idx * 3..idx * 3 + 3].copy_from_slice(&yuv_pixel(y, u, v));
        }
    }
    RgbImage::from_raw(width, height, raw)
}

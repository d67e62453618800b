//! Fuentes de vídeo decodificadas con GStreamer: ficheros locales y URLs de red
//! (RTSP o el enlace directo que devuelve el resolvedor de YouTube).
//!
//! Requiere las librerías de desarrollo de GStreamer:
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::ports::FrameSource;
use crate::domain::errors::{DomainError, DomainResult};

/// Tiempo máximo de espera de un frame antes de considerar la fuente caída.
const PULL_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum GstSourceError {
    #[error("GStreamer error: {0}")]
    Glib(#[from] gst::glib::Error),
    #[error("GStreamer boolean error: {0}")]
    Bool(#[from] gst::glib::BoolError),
    #[error("State change error: {0}")]
    StateChange(#[from] gst::StateChangeError),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("Unsupported video format")]
    UnsupportedFormat,
}

impl From<GstSourceError> for DomainError {
    fn from(e: GstSourceError) -> Self {
        DomainError::OperationFailed(e.to_string())
    }
}

/// Entrada que GStreamer sabe decodificar.
#[derive(Debug, Clone, PartialEq)]
pub enum GstInput {
    File(String),
    /// Fuente en vivo: se descartan frames si la inferencia va más lenta.
    Live(String),
    /// URL remota que se consume completa, sin descartar frames.
    Remote(String),
}

/// Descripción del pipeline que termina en un appsink RGB llamado `sink`.
pub fn pipeline_description(input: &GstInput) -> Result<String, GstSourceError> {
    let (head, drop) = match input {
        GstInput::File(path) => (format!("filesrc location=\"{}\" ! decodebin", quoted(path)?), false),
        GstInput::Live(uri) => (format!("uridecodebin uri=\"{}\"", quoted(uri)?), true),
        GstInput::Remote(uri) => (format!("uridecodebin uri=\"{}\"", quoted(uri)?), false),
    };
    Ok(format!(
        "{head} ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=2 drop={drop}"
    ))
}

fn quoted(value: &str) -> Result<&str, GstSourceError> {
    if value.contains('"') || value.contains('\n') {
        return Err(GstSourceError::Pipeline(format!("invalid location: {value}")));
    }
    Ok(value)
}

pub struct GstFrameSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
    }
}

impl GstFrameSource {
    pub fn open(input: &GstInput) -> Result<Self, GstSourceError> {
        gst::init()?;

        let description = pipeline_description(input)?;
        info!("GStreamer pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| GstSourceError::Pipeline("Failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| GstSourceError::Pipeline("appsink not found".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| GstSourceError::Pipeline("sink is not an appsink".into()))?;

        pipeline.set_state(gst::State::Playing)?;

        Ok(Self { pipeline, appsink })
    }

    fn bus_error(&self) -> Option<String> {
        let msg = self.pipeline.bus()?.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!(
                "{} ({})",
                err.error(),
                err.debug().map(|d| d.to_string()).unwrap_or_default()
            )),
            _ => None,
        }
    }
}

impl FrameSource for GstFrameSource {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        match self.appsink.try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS)) {
            Some(sample) => sample_to_rgb(&sample).map(Some).map_err(Into::into),
            None if self.appsink.is_eos() => Ok(None),
            None => Err(match self.bus_error() {
                Some(err) => DomainError::OperationFailed(err),
                None => DomainError::OperationFailed(format!("no frame received in {PULL_TIMEOUT_SECS}s")),
            }),
        }
    }
}

fn sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GstSourceError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| GstSourceError::Pipeline("No buffer in sample".into()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| GstSourceError::Pipeline("No caps in sample".into()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|_| GstSourceError::Pipeline("Failed to get video info from caps".into()))?;
    if info.format() != gst_video::VideoFormat::Rgb {
        return Err(GstSourceError::UnsupportedFormat);
    }

    let map = buffer
        .map_readable()
        .map_err(|e| GstSourceError::Pipeline(format!("Failed to map buffer: {e}")))?;
    let stride = info.stride()[0] as usize;
    rgb_from_strided(map.as_slice(), info.width(), info.height(), stride)
        .ok_or_else(|| GstSourceError::Pipeline("buffer smaller than frame".into()))
}

/// Copia filas RGB con relleno de `stride` bytes a una imagen compacta.
pub fn rgb_from_strided(data: &[u8], width: u32, height: u32, stride: usize) -> Option<RgbImage> {
    let row = width as usize * 3;
    if height == 0 || stride < row || data.len() < stride * (height as usize - 1) + row {
        return None;
    }
    let mut packed = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        packed.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    RgbImage::from_raw(width, height, packed)
}

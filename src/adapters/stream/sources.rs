use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::application::ports::{FrameSource, FrameSourceFactoryPort, StreamUrlResolverPort};
use crate::domain::camera::CameraId;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::source::StreamSource;

#[cfg(feature = "gstreamer")]
use crate::adapters::gst::source::{GstFrameSource, GstInput};
#[cfg(feature = "v4l2")]
use crate::adapters::v4l2::capture::{CaptureConfig, V4l2Capture};

/// Abre la fuente adecuada para cada rama: vídeo, webcam, RTSP o YouTube.
pub struct MediaSourceFactory {
    resolver: Arc<dyn StreamUrlResolverPort>,
}

impl MediaSourceFactory {
    pub fn new(resolver: Arc<dyn StreamUrlResolverPort>) -> Self {
        Self { resolver }
    }
}

impl FrameSourceFactoryPort for MediaSourceFactory {
    fn open(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSource>> {
        match source {
            StreamSource::Video(path) => {
                if !Path::new(path).is_file() {
                    return Err(DomainError::NotFound(format!("video file not found: {path}")));
                }
                open_gst(GstLocation::File(path.clone()))
            }
            StreamSource::Webcam(index) => open_webcam(CameraId::from_index(*index)),
            StreamSource::Rtsp(url) => open_gst(GstLocation::Live(url.clone())),
            StreamSource::Youtube(url) => {
                let direct = self.resolver.resolve(url)?;
                info!("YouTube resuelto a una URL directa ({} caracteres)", direct.len());
                open_gst(GstLocation::Remote(direct))
            }
        }
    }
}

enum GstLocation {
    File(String),
    Live(String),
    Remote(String),
}

#[cfg(feature = "gstreamer")]
fn open_gst(location: GstLocation) -> DomainResult<Box<dyn FrameSource>> {
    let input = match location {
        GstLocation::File(p) => GstInput::File(p),
        GstLocation::Live(u) => GstInput::Live(u),
        GstLocation::Remote(u) => GstInput::Remote(u),
    };
    Ok(Box::new(GstFrameSource::open(&input)?))
}

#[cfg(not(feature = "gstreamer"))]
fn open_gst(_location: GstLocation) -> DomainResult<Box<dyn FrameSource>> {
    Err(DomainError::OperationFailed("built without GStreamer support".into()))
}

#[cfg(feature = "v4l2")]
fn open_webcam(camera: CameraId) -> DomainResult<Box<dyn FrameSource>> {
    let capture = V4l2Capture::open(&CaptureConfig::webcam(camera.path.clone()))
        .map_err(|e| DomainError::NotFound(format!("{}: {e}", camera.path)))?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "v4l2"))]
fn open_webcam(_camera: CameraId) -> DomainResult<Box<dyn FrameSource>> {
    Err(DomainError::OperationFailed("built without V4L2 support".into()))
}

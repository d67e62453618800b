use async_trait::async_trait;
use tracing::debug;
use v4l::context::Node;
use v4l::Device;

use crate::application::ports::CameraCatalogPort;
use crate::domain::camera::{CameraId, CameraInfo};
use crate::domain::errors::DomainResult;

/// Webcams visibles en `/dev/video*`, ordenadas por índice.
#[derive(Default)]
pub struct V4l2CameraCatalog;

impl V4l2CameraCatalog {
    pub fn new() -> Self {
        Self
    }

    fn describe(node: &Node) -> Option<CameraInfo> {
        let path = node.path().to_string_lossy().into_owned();
        let caps = Device::with_path(&path)
            .and_then(|dev| dev.query_caps())
            .inspect_err(|e| debug!("Se omite {}: {}", path, e))
            .ok()?;
        Some(CameraInfo {
            name: node.name().unwrap_or_else(|| caps.card.clone()),
            id: CameraId { path },
            card: caps.card,
            driver: caps.driver,
            bus: caps.bus,
        })
    }
}

#[async_trait]
impl CameraCatalogPort for V4l2CameraCatalog {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        let mut cameras: Vec<CameraInfo> = v4l::context::enum_devices().iter().filter_map(Self::describe).collect();
        cameras.sort_by_key(|c| c.id.index());
        Ok(cameras)
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraId { pub path: String }

impl CameraId {
    pub fn from_index(index: u32) -> Self {
        Self { path: format!("/dev/video{}", index) }
    }

    pub fn index(&self) -> u32 {
        self.path.chars().filter(|ch| ch.is_ascii_digit()).collect::<String>().parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: CameraId,
    pub name: String,
    pub card: String,
    pub driver: String,
    pub bus: String,
}

use serde::{Deserialize, Serialize};

use super::detection::Detection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub infer_ms: f32,
    pub fps_est: f32,
    pub summary: String,
    pub detections: Vec<Detection>,
}

/// Eventos que el worker de streaming publica en el canal de difusión.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Frame(FrameMeta, Vec<u8>),
    Finished { source: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Frame { meta: FrameMeta },
    Finished { source: String },
    Error { message: String },
}

pub fn fps_ema(prev: f32, dt_secs: f32) -> f32 {
    0.9 * prev + 0.1 * (1.0 / dt_secs.max(0.001))
}

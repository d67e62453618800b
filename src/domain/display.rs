use serde::{Deserialize, Serialize};

/// Interruptores de visualización de la barra lateral.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_labels: bool,
    pub show_conf: bool,
    pub show_boxes: bool,
    pub show_masks: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self { show_labels: true, show_conf: true, show_boxes: true, show_masks: true }
    }
}

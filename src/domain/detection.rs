use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Máscara binaria recortada a la caja, en coordenadas de la imagen original.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x < self.x0 || y < self.y0 {
            return false;
        }
        let (lx, ly) = (x - self.x0, y - self.y0);
        lx < self.width && ly < self.height && self.data[(ly * self.width + lx) as usize]
    }

    pub fn pixel_count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
    pub label: String,
    #[serde(skip)]
    pub mask: Option<Mask>,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Fila cruda `[x1, y1, x2, y2, score, class]` para el volcado de resultados.
    pub fn as_row(&self) -> [f32; 6] {
        [self.x1, self.y1, self.x2, self.y2, self.score, self.class_id as f32]
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(&det.label).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, label: &str) -> Detection {
        Detection { x1, y1, x2, y2, score: 0.9, class_id: 0, label: label.into(), mask: None }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = det(0.0, 0.0, 10.0, 10.0, "person");
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(0.0, 0.0, 10.0, 10.0, "person");
        let b = det(20.0, 20.0, 30.0, 30.0, "person");
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn summary_counts_by_label() {
        let dets = vec![det(0.0, 0.0, 1.0, 1.0, "dog"), det(0.0, 0.0, 1.0, 1.0, "person"), det(0.0, 0.0, 1.0, 1.0, "dog")];
        assert_eq!(summarize_detections(&dets), "2 dog, 1 person");
    }
}

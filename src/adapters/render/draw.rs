use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;

use crate::application::ports::AnnotatorPort;
use crate::domain::detection::{Detection, DetectionResult};
use crate::domain::display::DisplayOptions;

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 3;
const MASK_ALPHA: f32 = 0.5;

/// Paleta de 20 colores de Ultralytics, indexada por clase.
const PALETTE: [[u8; 3]; 20] = [
    [0x04, 0x2A, 0xFF], [0x0B, 0xDB, 0xEB], [0xF3, 0xF3, 0xF3], [0x00, 0xDF, 0xB7], [0x11, 0x1F, 0x68],
    [0xFF, 0x6F, 0xDD], [0xFF, 0x44, 0x4F], [0xCC, 0xED, 0x00], [0x00, 0xF3, 0x44], [0xBD, 0x00, 0xFF],
    [0x00, 0xB4, 0xFF], [0xDD, 0x00, 0xBA], [0x00, 0xFF, 0xFF], [0x26, 0xC0, 0x00], [0x01, 0xFF, 0xB3],
    [0x7D, 0x24, 0xFF], [0x7B, 0x00, 0x68], [0xFF, 0x1B, 0x6C], [0xFC, 0x6D, 0x2F], [0xA2, 0xFF, 0x0B],
];

pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// Fuente por defecto de las etiquetas.
const DEFAULT_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

/// Dibuja cajas, etiquetas y máscaras sobre una copia del frame.
pub struct Draw {
    font: FontArc,
    font_size: f32,
}

impl Draw {
    /// Annotador con la fuente DejaVu Sans embebida.
    pub fn new() -> Result<Self> {
        let font = FontArc::try_from_slice(DEFAULT_FONT)?;
        Ok(Self { font, font_size: LABEL_FONT_SIZE })
    }

    /// Sustituye la fuente embebida por un TTF/OTF del disco.
    pub fn with_font_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("no se pudo leer {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes).with_context(|| format!("fuente inválida: {}", path.display()))?;
        info!("Fuente de etiquetas cargada desde {}", path.display());
        Ok(Self { font, font_size: LABEL_FONT_SIZE })
    }

    fn draw_mask(&self, image: &mut RgbImage, det: &Detection, color: [u8; 3]) {
        let Some(mask) = det.mask.as_ref() else { return };
        for ly in 0..mask.height {
            for lx in 0..mask.width {
                let (x, y) = (mask.x0 + lx, mask.y0 + ly);
                if x >= image.width() || y >= image.height() || !mask.data[(ly * mask.width + lx) as usize] {
                    continue;
                }
                let px = image.get_pixel_mut(x, y);
                for c in 0..3 {
                    px[c] = (px[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA) as u8;
                }
            }
        }
    }

    fn draw_box(&self, image: &mut RgbImage, det: &Detection, color: [u8; 3], text: Option<String>) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        let x_min = (det.x1.floor() as i32).clamp(0, w - 1);
        let y_min = (det.y1.floor() as i32).clamp(0, h - 1);
        let x_max = (det.x2.ceil() as i32).clamp(0, w - 1);
        let y_max = (det.y2.ceil() as i32).clamp(0, h - 1);
        if x_min >= x_max || y_min >= y_max {
            return;
        }

        // Borde de 2 píxeles.
        for t in 0..2 {
            let bw = (x_max - x_min - 2 * t).max(1) as u32;
            let bh = (y_max - y_min - 2 * t).max(1) as u32;
            draw_hollow_rect_mut(image, Rect::at(x_min + t, y_min + t).of_size(bw, bh), Rgb(color));
        }

        let Some(text) = text else { return };
        let font = &self.font;
        let scale = PxScale::from(self.font_size);
        let (tw, th) = text_size(scale, font, &text);
        let label_h = th as i32 + 2 * LABEL_PADDING;
        let label_y = if y_min - label_h >= 0 { y_min - label_h } else { y_min };
        let label_w = (tw as i32 + 2 * LABEL_PADDING).min(w - x_min).max(1) as u32;

        draw_filled_rect_mut(image, Rect::at(x_min, label_y).of_size(label_w, label_h as u32), Rgb(color));
        draw_text_mut(
            image,
            Rgb([255, 255, 255]),
            x_min + LABEL_PADDING,
            label_y + LABEL_PADDING,
            scale,
            font,
            &text,
        );
    }
}

/// Texto de la etiqueta según los interruptores de etiqueta y confianza.
pub fn label_text(det: &Detection, display: &DisplayOptions) -> Option<String> {
    match (display.show_labels, display.show_conf) {
        (true, true) => Some(format!("{} {:.2}", det.label, det.score)),
        (true, false) => Some(det.label.clone()),
        (false, true) => Some(format!("{:.2}", det.score)),
        (false, false) => None,
    }
}

impl AnnotatorPort for Draw {
    fn annotate(&self, image: &RgbImage, result: &DetectionResult, display: &DisplayOptions) -> RgbImage {
        let mut out = image.clone();
        if display.show_masks {
            for det in &result.detections {
                self.draw_mask(&mut out, det, class_color(det.class_id));
            }
        }
        if display.show_boxes {
            for det in &result.detections {
                self.draw_box(&mut out, det, class_color(det.class_id), label_text(det, display));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::Mask;

    fn detection(mask: Option<Mask>) -> Detection {
        Detection { x1: 10.0, y1: 10.0, x2: 50.0, y2: 40.0, score: 0.87, class_id: 2, label: "car".into(), mask }
    }

    fn result(dets: Vec<Detection>) -> DetectionResult {
        DetectionResult { width: 64, height: 48, detections: dets }
    }

    #[test]
    fn annotated_image_keeps_input_dimensions() {
        let img = RgbImage::new(64, 48);
        let out = Draw::new().unwrap().annotate(&img, &result(vec![detection(None)]), &DisplayOptions::default());
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn boxes_use_the_class_color() {
        let img = RgbImage::new(64, 48);
        let display = DisplayOptions { show_labels: false, show_conf: false, ..DisplayOptions::default() };
        let out = Draw::new().unwrap().annotate(&img, &result(vec![detection(None)]), &display);
        assert_eq!(out.get_pixel(10, 25).0, class_color(2));
        assert_eq!(out.get_pixel(30, 25).0, [0, 0, 0]);
    }

    #[test]
    fn label_toggles_change_the_rendered_frame() {
        let img = RgbImage::new(64, 48);
        let draw = Draw::new().unwrap();
        let with_labels = draw.annotate(&img, &result(vec![detection(None)]), &DisplayOptions::default());
        let without = DisplayOptions { show_labels: false, show_conf: false, ..DisplayOptions::default() };
        let bare = draw.annotate(&img, &result(vec![detection(None)]), &without);

        assert_ne!(with_labels, bare);
        // Sin hueco encima de la caja, el fondo de la etiqueta cae dentro de ella.
        assert_eq!(bare.get_pixel(14, 12).0, [0, 0, 0]);
        assert_ne!(with_labels.get_pixel(14, 12).0, [0, 0, 0]);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(Draw::with_font_path(Path::new("/nonexistent/font.ttf")).is_err());
    }

    #[test]
    fn disabled_boxes_leave_the_frame_untouched() {
        let img = RgbImage::from_pixel(64, 48, Rgb([9, 9, 9]));
        let display = DisplayOptions { show_boxes: false, show_masks: false, ..DisplayOptions::default() };
        let out = Draw::new().unwrap().annotate(&img, &result(vec![detection(None)]), &display);
        assert_eq!(out, img);
    }

    #[test]
    fn masks_are_blended_inside_the_mask_only() {
        let img = RgbImage::new(64, 48);
        let mask = Mask { x0: 20, y0: 20, width: 2, height: 1, data: vec![true, false] };
        let display = DisplayOptions { show_boxes: false, ..DisplayOptions::default() };
        let out = Draw::new().unwrap().annotate(&img, &result(vec![detection(Some(mask))]), &display);

        let c = class_color(2);
        assert_eq!(out.get_pixel(20, 20).0, [(c[0] as f32 * 0.5) as u8, (c[1] as f32 * 0.5) as u8, (c[2] as f32 * 0.5) as u8]);
        assert_eq!(out.get_pixel(21, 20).0, [0, 0, 0]);
    }

    #[test]
    fn label_text_follows_toggles() {
        let d = detection(None);
        let mut display = DisplayOptions::default();
        assert_eq!(label_text(&d, &display).as_deref(), Some("car 0.87"));
        display.show_conf = false;
        assert_eq!(label_text(&d, &display).as_deref(), Some("car"));
        display.show_labels = false;
        assert_eq!(label_text(&d, &display), None);
    }
}

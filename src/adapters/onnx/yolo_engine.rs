use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use tracing::{debug, info, warn};

use crate::application::ports::{Detector, DetectorFactoryPort};
use crate::domain::detection::{Detection, DetectionResult, Mask};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{ModelId, YoloParams};

/// Número de coeficientes de máscara de las cabezas de segmentación YOLOv8.
const MASK_COEFFS: usize = 32;
const MASK_THRESHOLD: f32 = 0.5;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub struct OnnxYoloEngine {
    session: Session,
    names: Vec<String>,
    /// Lado de la entrada si el export es estático (`[1, 3, 640, 640]`).
    fixed_size: Option<u32>,
    warned_size: Option<u32>,
}

impl OnnxYoloEngine {
    pub fn load(path: &str, intra_threads: usize) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(intra_threads)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        // Los exports de Ultralytics guardan las clases en los metadatos ("names").
        let names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .map(|raw| parse_names(&raw))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| COCO_CLASSES.iter().map(|s| s.to_string()).collect());

        let fixed_size = session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .and_then(|shape| fixed_input_size(shape));

        match fixed_size {
            Some(size) => info!("Modelo {} cargado ({} clases, entrada fija {}x{})", path, names.len(), size, size),
            None => info!("Modelo {} cargado ({} clases, entrada dinámica)", path, names.len()),
        }
        Ok(Self { session, names, fixed_size, warned_size: None })
    }

    /// Tamaño real de la entrada: un export estático impone el suyo.
    fn input_size_for(&mut self, requested: u32) -> u32 {
        let size = effective_input_size(requested, self.fixed_size);
        if size != requested && self.warned_size != Some(requested) {
            warn!("imgsz={} no admitido por el modelo (entrada fija {}), se usa {}", requested, size, size);
            self.warned_size = Some(requested);
        }
        size
    }

    pub fn infer(&mut self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Detection>> {
        let params = &YoloParams { input_size: self.input_size_for(params.input_size), ..params.clone() };
        let imgsz = params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec()))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let preds = ArrayViewD::from_shape(IxDyn(&dims), data_out)?
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()?
            .to_owned();

        // Segmentación: segunda salida con los prototipos [1, 32, mh, mw].
        let protos = if outputs.len() > 1 {
            let (shape_p, data_p) = outputs[1].try_extract_tensor::<f32>()?;
            let dims_p: Vec<usize> = shape_p.iter().map(|&x| x as usize).collect();
            let protos = ArrayViewD::from_shape(IxDyn(&dims_p), data_p)?
                .index_axis_move(Axis(0), 0)
                .into_dimensionality::<Ix3>()?
                .to_owned();
            Some(protos)
        } else {
            None
        };

        let num_classes = preds.shape()[0]
            .checked_sub(4 + if protos.is_some() { MASK_COEFFS } else { 0 })
            .filter(|&n| n > 0)
            .ok_or_else(|| anyhow!("unexpected YOLO output shape {:?}", dims))?;

        Ok(decode_predictions(
            preds.view(),
            protos.as_ref().map(|p| p.view()),
            num_classes,
            params,
            (rgb.width(), rgb.height()),
            &self.names,
        ))
    }
}

impl Detector for OnnxYoloEngine {
    fn detect(&mut self, image: &RgbImage, params: &YoloParams) -> DomainResult<DetectionResult> {
        let detections = self
            .infer(image, params)
            .map_err(|e| DomainError::OperationFailed(format!("inferencia fallida: {e}")))?;
        Ok(DetectionResult { width: image.width(), height: image.height(), detections })
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }
}

/// Crea motores ONNX a partir de la ruta de pesos.
pub struct OnnxDetectorFactory {
    intra_threads: usize,
}

impl OnnxDetectorFactory {
    pub fn new(intra_threads: usize) -> Self {
        Self { intra_threads: intra_threads.max(1) }
    }
}

impl DetectorFactoryPort for OnnxDetectorFactory {
    fn load(&self, model: &ModelId) -> DomainResult<Box<dyn Detector>> {
        let engine = OnnxYoloEngine::load(&model.onnx_path, self.intra_threads)
            .map_err(|e| DomainError::OperationFailed(e.to_string()))?;
        Ok(Box::new(engine))
    }
}

/// Lado de una entrada `[1, 3, H, W]` cuadrada y sin dimensiones dinámicas (-1).
pub fn fixed_input_size(shape: &[i64]) -> Option<u32> {
    match shape {
        [_, _, h, w] if *h > 0 && h == w => u32::try_from(*h).ok(),
        _ => None,
    }
}

pub fn effective_input_size(requested: u32, fixed: Option<u32>) -> u32 {
    fixed.unwrap_or(requested)
}

/// Convierte la salida `[4 + nc (+ 32), N]` en detecciones sobre la imagen original.
pub fn decode_predictions(
    preds: ArrayView2<f32>,
    protos: Option<ArrayView3<f32>>,
    num_classes: usize,
    params: &YoloParams,
    (img_w, img_h): (u32, u32),
    names: &[String],
) -> Vec<Detection> {
    let imgsz = params.input_size as f32;
    let sx = img_w as f32 / imgsz;
    let sy = img_h as f32 / imgsz;

    let mut candidates: Vec<(Detection, Vec<f32>)> = Vec::new();
    for i in 0..preds.shape()[1] {
        let scores = preds.slice(s![4..4 + num_classes, i]);
        let Some((class_id, &max_score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(*b))
        else {
            continue;
        };

        if max_score <= params.conf_threshold {
            continue;
        }

        let cx = preds[[0, i]];
        let cy = preds[[1, i]];
        let w = preds[[2, i]];
        let h = preds[[3, i]];

        let coeffs = if protos.is_some() {
            preds.slice(s![4 + num_classes..4 + num_classes + MASK_COEFFS, i]).to_vec()
        } else {
            Vec::new()
        };

        candidates.push((
            Detection {
                x1: ((cx - w / 2.0) * sx).clamp(0.0, img_w as f32),
                y1: ((cy - h / 2.0) * sy).clamp(0.0, img_h as f32),
                x2: ((cx + w / 2.0) * sx).clamp(0.0, img_w as f32),
                y2: ((cy + h / 2.0) * sy).clamp(0.0, img_h as f32),
                score: max_score,
                class_id,
                label: names.get(class_id).cloned().unwrap_or_else(|| format!("class{class_id}")),
                mask: None,
            },
            coeffs,
        ));
    }

    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
    debug!("{} detecciones tras NMS", kept.len());

    match protos {
        Some(protos) => kept
            .into_iter()
            .map(|(mut det, coeffs)| {
                det.mask = Some(build_mask(&det, &coeffs, protos, (img_w, img_h)));
                det
            })
            .collect(),
        None => kept.into_iter().map(|(det, _)| det).collect(),
    }
}

/// NMS por clase: ordena por confianza y descarta solapamientos de la misma clase.
pub fn non_max_suppression<T>(mut candidates: Vec<(Detection, T)>, iou_threshold: f32, max_det: usize) -> Vec<(Detection, T)> {
    candidates.sort_unstable_by(|a, b| b.0.score.total_cmp(&a.0.score));

    let mut kept: Vec<(Detection, T)> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_det {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|(k, _)| k.class_id == cand.0.class_id && k.iou(&cand.0) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

/// Combina los prototipos con los coeficientes y recorta el resultado a la caja.
fn build_mask(det: &Detection, coeffs: &[f32], protos: ArrayView3<f32>, (img_w, img_h): (u32, u32)) -> Mask {
    let (_, mh, mw) = protos.dim();
    let x0 = det.x1.floor().max(0.0) as u32;
    let y0 = det.y1.floor().max(0.0) as u32;
    let x1 = (det.x2.ceil() as u32).min(img_w);
    let y1 = (det.y2.ceil() as u32).min(img_h);
    let width = x1.saturating_sub(x0);
    let height = y1.saturating_sub(y0);

    let mut data = vec![false; (width * height) as usize];
    for ly in 0..height {
        let py = (((y0 + ly) as f32 + 0.5) / img_h as f32 * mh as f32) as usize;
        for lx in 0..width {
            let px = (((x0 + lx) as f32 + 0.5) / img_w as f32 * mw as f32) as usize;
            let logit: f32 = coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * protos[[k, py.min(mh - 1), px.min(mw - 1)]])
                .sum();
            data[(ly * width + lx) as usize] = sigmoid(logit) > MASK_THRESHOLD;
        }
    }

    Mask { x0, y0, width, height, data }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Interpreta el diccionario `{0: 'person', 1: 'bicycle'}` de los metadatos.
pub fn parse_names(raw: &str) -> Vec<String> {
    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            chars.next();
            continue;
        }
        let mut idx = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            idx.push(d);
            chars.next();
        }
        while chars.peek().is_some_and(|c| *c == ':' || c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next().filter(|q| *q == '\'' || *q == '"') else {
            continue;
        };
        let name: String = chars.by_ref().take_while(|c| *c != quote).collect();
        if let Ok(idx) = idx.parse() {
            entries.push((idx, name));
        }
    }

    entries.sort_by_key(|(idx, _)| *idx);
    entries.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn names() -> Vec<String> {
        COCO_CLASSES.iter().map(|s| s.to_string()).collect()
    }

    /// Salida con 2 clases: columnas = candidatos.
    fn preds(rows: &[[f32; 6]]) -> Array2<f32> {
        let mut a = Array2::<f32>::zeros((6, rows.len()));
        for (i, r) in rows.iter().enumerate() {
            for (j, v) in r.iter().enumerate() {
                a[[j, i]] = *v;
            }
        }
        a
    }

    #[test]
    fn static_exports_impose_their_input_size() {
        assert_eq!(fixed_input_size(&[1, 3, 640, 640]), Some(640));
        assert_eq!(fixed_input_size(&[-1, 3, -1, -1]), None);
        assert_eq!(fixed_input_size(&[1, 3, 480, 640]), None);

        assert_eq!(effective_input_size(320, Some(640)), 640);
        assert_eq!(effective_input_size(1280, None), 1280);
    }

    #[test]
    fn parses_ultralytics_names_metadata() {
        let parsed = parse_names("{0: 'person', 1: 'bicycle', 2: \"traffic light\"}");
        assert_eq!(parsed, vec!["person", "bicycle", "traffic light"]);
    }

    #[test]
    fn boxes_are_scaled_to_the_original_image() {
        let params = YoloParams { input_size: 640, conf_threshold: 0.25, ..YoloParams::default() };
        let p = preds(&[[320.0, 320.0, 64.0, 64.0, 0.9, 0.1]]);
        let dets = decode_predictions(p.view(), None, 2, &params, (1280, 320), &names());

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x1, d.x2), (576.0, 704.0));
        assert_eq!((d.y1, d.y2), (144.0, 176.0));
        assert_eq!(d.label, "person");
    }

    #[test]
    fn confidence_threshold_filters_candidates() {
        let params = YoloParams { conf_threshold: 0.5, ..YoloParams::default() };
        let p = preds(&[
            [100.0, 100.0, 20.0, 20.0, 0.45, 0.0],
            [300.0, 300.0, 20.0, 20.0, 0.0, 0.8],
        ]);
        let dets = decode_predictions(p.view(), None, 2, &params, (640, 640), &names());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].label, "bicycle");
    }

    #[test]
    fn overlapping_boxes_of_the_same_class_are_suppressed() {
        let params = YoloParams { conf_threshold: 0.25, iou_threshold: 0.45, ..YoloParams::default() };
        let p = preds(&[
            [100.0, 100.0, 40.0, 40.0, 0.9, 0.0],
            [102.0, 101.0, 40.0, 40.0, 0.8, 0.0],
            [102.0, 101.0, 40.0, 40.0, 0.0, 0.7],
        ]);
        let dets = decode_predictions(p.view(), None, 2, &params, (640, 640), &names());
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].score, 0.9);
        assert_eq!(dets[1].class_id, 1);
    }

    #[test]
    fn max_detections_caps_the_output() {
        let params = YoloParams { max_detections: 1, ..YoloParams::default() };
        let p = preds(&[
            [100.0, 100.0, 20.0, 20.0, 0.9, 0.0],
            [400.0, 400.0, 20.0, 20.0, 0.95, 0.0],
        ]);
        let dets = decode_predictions(p.view(), None, 2, &params, (640, 640), &names());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].score, 0.95);
    }

    #[test]
    fn segmentation_masks_are_cropped_to_the_box() {
        let params = YoloParams { input_size: 64, conf_threshold: 0.25, ..YoloParams::default() };
        let mut p = Array2::<f32>::zeros((4 + 1 + MASK_COEFFS, 1));
        p[[0, 0]] = 32.0;
        p[[1, 0]] = 32.0;
        p[[2, 0]] = 32.0;
        p[[3, 0]] = 32.0;
        p[[4, 0]] = 0.9;
        p[[5, 0]] = 1.0;
        // Primer prototipo positivo en todo el plano: la máscara cubre la caja entera.
        let mut protos = Array3::<f32>::zeros((MASK_COEFFS, 16, 16));
        protos.slice_mut(s![0, .., ..]).fill(4.0);

        let dets = decode_predictions(p.view(), Some(protos.view()), 1, &params, (64, 64), &names());
        let mask = dets[0].mask.as_ref().unwrap();
        assert_eq!((mask.x0, mask.y0, mask.width, mask.height), (16, 16, 32, 32));
        assert_eq!(mask.pixel_count(), 32 * 32);
        assert!(mask.get(20, 20));
        assert!(!mask.get(5, 5));
    }
}

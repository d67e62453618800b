pub mod model_catalog;
pub mod yolo_engine;

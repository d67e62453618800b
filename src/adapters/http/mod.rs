pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use crate::adapters::http::state::HttpState;
use crate::adapters::http::ws::ws_handler;

/// Límite de subida: los pesos ONNX superan el límite por defecto de Axum.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/config", get(routes::get_config))
        .route("/api/sources", get(routes::list_sources))
        .route("/api/cameras", get(routes::list_cameras))
        .route("/api/model/weights", post(routes::upload_weights))
        .route("/api/model/load", post(routes::load_model))
        .route("/api/default-image", get(routes::default_image))
        .route("/api/default-image/detected", get(routes::default_detected_image))
        .route("/api/detect/preview", post(routes::preview_image))
        .route("/api/detect/image", post(routes::detect_image))
        .route("/api/detect/image/download", get(routes::download_result))
        .route("/api/stream", post(routes::start_stream))
        .route("/api/stream/stop", post(routes::stop_stream))
        .route("/ws/stream", get(ws_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::Ordering, Arc};

    use async_trait::async_trait;
    use axum::{body::Body, http::{header, Request, StatusCode}};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::adapters::files::video_library::VideoLibrary;
    use crate::application::ports::CameraCatalogPort;
    use crate::application::services::fakes::*;
    use crate::application::services::{CameraService, ImagePaths, ImageService, ModelService, PipelineService};
    use crate::domain::{camera::CameraInfo, errors::DomainResult, source::StreamSource};

    struct NoCameras;

    #[async_trait]
    impl CameraCatalogPort for NoCameras {
        async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        app: Router,
        factory: Arc<RecordingFactory>,
        stream: Arc<RecordingStream>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("det.onnx"), b"onnx").unwrap();
        let factory = Arc::new(RecordingFactory::default());
        let stream = Arc::new(RecordingStream::default());
        let models = Arc::new(ModelService::new(
            Arc::new(FakeCatalog { dir: dir.path().to_path_buf() }),
            factory.clone(),
        ));
        let images = Arc::new(ImageService::new(
            models.clone(),
            Arc::new(PassThroughAnnotator),
            ImagePaths {
                default_image: dir.path().join("default.png"),
                default_detected_image: dir.path().join("default_detected.png"),
                download_path: dir.path().join("res.jpg"),
            },
        ));
        let state = HttpState {
            pipeline: Arc::new(PipelineService::new(stream.clone(), models.clone())),
            models,
            images,
            camera: Arc::new(CameraService::new(Arc::new(NoCameras))),
            videos: Arc::new(VideoLibrary::new(dir.path().join("videos"))),
            webcam_index: 2,
        };
        Harness { app: router(state), factory, stream, _dir: dir }
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_image(name: &str, bytes: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        for (k, v) in fields {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{k}\"\r\n\r\n{v}\r\n").as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/detect/image")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_source_is_rejected_before_any_inference() {
        let h = harness();
        let res = h
            .app
            .oneshot(json_post("/api/stream", r#"{"source":"Screen","value":""}"#))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["error"], "Please select a valid source type!");
        assert!(h.factory.loads.lock().unwrap().is_empty());
        assert!(h.stream.configured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_webcam_value_uses_configured_index() {
        let h = harness();
        let res = h
            .app
            .oneshot(json_post("/api/stream", r#"{"source":"Webcam","value":"","confidence":70}"#))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let configured = h.stream.configured.lock().unwrap();
        assert_eq!(configured.len(), 1);
        assert_eq!(configured[0].source, StreamSource::Webcam(2));
        assert_eq!(configured[0].infer.params.conf_threshold, 0.70);
    }

    #[tokio::test]
    async fn unlisted_video_is_not_found() {
        let h = harness();
        let res = h
            .app
            .oneshot(json_post("/api/stream", r#"{"source":"Video","value":"../secret.mp4"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(h.stream.configured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_reaches_the_stream() {
        let h = harness();
        let res = h.app.oneshot(json_post("/api/stream/stop", "{}")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(h.stream.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn config_exposes_slider_defaults() {
        let h = harness();
        let res = h
            .app
            .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["defaults"]["confidence"], 40);
        assert_eq!(body["confidence_min"], 25);
        assert_eq!(body["webcam_index"], 2);
        assert_eq!(body["sources"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn detected_image_can_be_downloaded() {
        let h = harness();
        let res = h
            .app
            .clone()
            .oneshot(multipart_image("street.png", &png_bytes(32, 24), &[("confidence", "55"), ("image_size", "320")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["download_name"], "street_detect.jpg");
        assert_eq!(body["width"], 32);
        assert_eq!(body["summary"], "1 person");
        assert_eq!(h.factory.seen.lock().unwrap()[0].input_size, 320);

        let res = h
            .app
            .oneshot(Request::builder().uri("/api/detect/image/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert!(res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().contains("street_detect.jpg"));
    }

    #[tokio::test]
    async fn corrupt_upload_reports_the_open_banner() {
        let h = harness();
        let res = h.app.oneshot(multipart_image("broken.png", b"not an image", &[])).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(res).await;
        assert_eq!(body["error"], "Error occurred while opening the image.");
        assert!(h.factory.loads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_before_any_detection_is_not_found() {
        let h = harness();
        let res = h
            .app
            .oneshot(Request::builder().uri("/api/detect/image/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

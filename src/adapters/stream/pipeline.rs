use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::application::ports::{
    AnnotatorPort, Detector, DetectorFactoryPort, FrameSource, FrameSourceFactoryPort, StreamConfig, StreamPort,
};
use crate::application::services::encode_jpeg;
use crate::domain::{
    detection::summarize_detections,
    errors::{DomainError, DomainResult},
    stream::{fps_ema, FrameMeta, StreamEvent},
};

const IDLE_SLEEP: Duration = Duration::from_millis(100);
const STREAM_JPEG_QUALITY: u8 = 80;

/// Configuración activa; `generation` cambia en cada `configure`.
#[derive(Clone)]
struct Active {
    generation: u64,
    config: StreamConfig,
}

/// Worker de streaming: un hilo dedicado abre la fuente, infiere cada frame y
/// publica el resultado anotado en un canal de difusión.
pub struct PipelineAdapter {
    cfg: Arc<RwLock<Option<Active>>>,
    next_generation: AtomicU64,
    tx: broadcast::Sender<StreamEvent>,
}

impl PipelineAdapter {
    pub fn new(
        sources: Arc<dyn FrameSourceFactoryPort>,
        detectors: Arc<dyn DetectorFactoryPort>,
        annotator: Arc<dyn AnnotatorPort>,
    ) -> Self {
        let (tx, _) = broadcast::channel(16);
        let adapter = Self {
            cfg: Arc::new(RwLock::new(None)),
            next_generation: AtomicU64::new(1),
            tx,
        };

        let worker = Worker {
            cfg: adapter.cfg.clone(),
            tx: adapter.tx.clone(),
            sources,
            detectors,
            annotator,
        };
        std::thread::spawn(move || worker.run());
        adapter
    }
}

struct Running {
    generation: u64,
    label: String,
    source: Box<dyn FrameSource>,
    frame_index: u64,
    fps_est: f32,
    last_t: Instant,
}

struct Worker {
    cfg: Arc<RwLock<Option<Active>>>,
    tx: broadcast::Sender<StreamEvent>,
    sources: Arc<dyn FrameSourceFactoryPort>,
    detectors: Arc<dyn DetectorFactoryPort>,
    annotator: Arc<dyn AnnotatorPort>,
}

impl Worker {
    fn run(self) {
        let mut running: Option<Running> = None;
        let mut detector: Option<(String, Box<dyn Detector>)> = None;

        info!("Pipeline Worker: hilo de procesamiento iniciado.");

        loop {
            let current = self.cfg.read().ok().and_then(|lock| lock.clone());

            let Some(active) = current else {
                if let Some(run) = running.take() {
                    info!("Pipeline: {} detenido tras {} frames", run.label, run.frame_index);
                    let _ = self.tx.send(StreamEvent::Finished { source: run.label });
                }
                std::thread::sleep(IDLE_SLEEP);
                continue;
            };

            // Nueva configuración: se reabre la fuente y, si cambió, el modelo.
            if running.as_ref().map(|r| r.generation) != Some(active.generation) {
                running = None;
                match self.prepare(&active, &mut detector) {
                    Ok(source) => {
                        running = Some(Running {
                            generation: active.generation,
                            label: active.config.source.describe(),
                            source,
                            frame_index: 0,
                            fps_est: 0.0,
                            last_t: Instant::now(),
                        });
                    }
                    Err(e) => {
                        self.fail(active.generation, e);
                        continue;
                    }
                }
            }

            let (Some(run), Some((_, det))) = (running.as_mut(), detector.as_mut()) else {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            };

            match run.source.next_frame() {
                Ok(Some(rgb)) => {
                    if let Err(e) = self.process(run, det.as_mut(), &rgb, &active.config) {
                        running = None;
                        self.fail(active.generation, e);
                    }
                }
                Ok(None) => {
                    info!("Pipeline: fuente {} agotada tras {} frames", run.label, run.frame_index);
                    let label = run.label.clone();
                    running = None;
                    self.clear_if_current(active.generation);
                    let _ = self.tx.send(StreamEvent::Finished { source: label });
                }
                Err(e) => {
                    warn!("Error leyendo frame: {}", e);
                    running = None;
                    self.fail(active.generation, e);
                }
            }
        }
    }

    fn prepare(
        &self,
        active: &Active,
        detector: &mut Option<(String, Box<dyn Detector>)>,
    ) -> DomainResult<Box<dyn FrameSource>> {
        let model = &active.config.infer.model;
        let key = format!("{}#{}", model.onnx_path, active.config.revision);

        if detector.as_ref().map(|(k, _)| k.as_str()) != Some(key.as_str()) {
            info!("Pipeline: cargando modelo {}", model.onnx_path);
            *detector = None;
            let loaded = self
                .detectors
                .load(model)
                .map_err(|e| DomainError::ModelLoad { path: model.onnx_path.clone(), detail: e.detail() })?;
            *detector = Some((key, loaded));
        }

        info!("Pipeline: abriendo {}", active.config.source.describe());
        self.sources.open(&active.config.source)
    }

    fn process(&self, run: &mut Running, detector: &mut dyn Detector, rgb: &image::RgbImage, config: &StreamConfig) -> DomainResult<()> {
        let t_infer_start = Instant::now();
        let result = detector.detect(rgb, &config.infer.params)?;
        let infer_ms = t_infer_start.elapsed().as_secs_f32() * 1000.0;

        let dt = run.last_t.elapsed().as_secs_f32();
        run.last_t = Instant::now();
        run.fps_est = fps_ema(run.fps_est, dt);
        run.frame_index += 1;

        // Sin suscriptores no merece la pena anotar ni codificar.
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }

        let annotated = self.annotator.annotate(rgb, &result, &config.display);
        let jpeg = encode_jpeg(&annotated, STREAM_JPEG_QUALITY)?;
        let meta = FrameMeta {
            frame_index: run.frame_index,
            width: result.width,
            height: result.height,
            infer_ms,
            fps_est: run.fps_est,
            summary: summarize_detections(&result.detections),
            detections: result.detections,
        };
        let _ = self.tx.send(StreamEvent::Frame(meta, jpeg));
        Ok(())
    }

    fn fail(&self, generation: u64, e: DomainError) {
        error!("Pipeline: {}", e);
        self.clear_if_current(generation);
        let message = match &e {
            DomainError::ModelLoad { detail, .. } => format!("{e} ({detail})"),
            other => other.to_string(),
        };
        let _ = self.tx.send(StreamEvent::Error { message });
    }

    /// Sin reconexión: al terminar o fallar se descarta la configuración si sigue siendo la misma.
    fn clear_if_current(&self, generation: u64) {
        if let Ok(mut lock) = self.cfg.write() {
            if lock.as_ref().map(|a| a.generation) == Some(generation) {
                *lock = None;
            }
        }
    }
}

#[async_trait]
impl StreamPort for PipelineAdapter {
    async fn configure(&self, config: StreamConfig) -> DomainResult<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut lock = self.cfg.write()
            .map_err(|_| DomainError::OperationFailed("Lock de configuración fallido".into()))?;
        *lock = Some(Active { generation, config });
        Ok(())
    }

    async fn stop(&self) -> DomainResult<()> {
        let mut lock = self.cfg.write()
            .map_err(|_| DomainError::OperationFailed("Lock de configuración fallido".into()))?;
        *lock = None;
        Ok(())
    }

    async fn subscribe(&self) -> DomainResult<broadcast::Receiver<StreamEvent>> {
        Ok(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::fakes::{PassThroughAnnotator, RecordingFactory};
    use crate::domain::{
        display::DisplayOptions,
        model::{InferenceConfig, ModelId, YoloParams},
        source::StreamSource,
    };
    use image::RgbImage;
    use std::sync::Mutex;

    struct CountedSource {
        remaining: usize,
    }

    impl FrameSource for CountedSource {
        fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbImage::new(32, 24)))
        }
    }

    struct FakeSources {
        frames: usize,
        opened: Mutex<Vec<StreamSource>>,
        fail: bool,
    }

    impl FrameSourceFactoryPort for FakeSources {
        fn open(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSource>> {
            self.opened.lock().unwrap().push(source.clone());
            if self.fail {
                return Err(DomainError::NotFound("camera unplugged".into()));
            }
            Ok(Box::new(CountedSource { remaining: self.frames }))
        }
    }

    fn config(source: StreamSource, params: YoloParams) -> StreamConfig {
        StreamConfig {
            source,
            infer: InferenceConfig {
                model: ModelId { name: "det".into(), onnx_path: "weights/det.onnx".into() },
                params,
            },
            display: DisplayOptions::default(),
            revision: 0,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
                Ok(event) => return event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("channel closed: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn video_frames_are_streamed_until_the_source_ends() {
        let sources = Arc::new(FakeSources { frames: 3, opened: Mutex::new(vec![]), fail: false });
        let detectors = Arc::new(RecordingFactory::default());
        let adapter = PipelineAdapter::new(sources.clone(), detectors.clone(), Arc::new(PassThroughAnnotator));
        let mut rx = adapter.subscribe().await.unwrap();

        let params = YoloParams::from_slider(65, 320).unwrap();
        adapter.configure(config(StreamSource::Video("clip.mp4".into()), params.clone())).await.unwrap();

        for expected in 1..=3u64 {
            match next_event(&mut rx).await {
                StreamEvent::Frame(meta, jpeg) => {
                    assert_eq!(meta.frame_index, expected);
                    assert_eq!((meta.width, meta.height), (32, 24));
                    assert_eq!(meta.summary, "1 person");
                    assert!(!jpeg.is_empty());
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Finished { .. }));

        assert!(detectors.seen.lock().unwrap().iter().all(|p| *p == params));
        assert_eq!(detectors.loads.lock().unwrap().as_slice(), &["weights/det.onnx".to_string()]);
    }

    #[tokio::test]
    async fn open_failures_are_reported_once_without_reconnecting() {
        let sources = Arc::new(FakeSources { frames: 0, opened: Mutex::new(vec![]), fail: true });
        let adapter = PipelineAdapter::new(sources.clone(), Arc::new(RecordingFactory::default()), Arc::new(PassThroughAnnotator));
        let mut rx = adapter.subscribe().await.unwrap();

        adapter.configure(config(StreamSource::Rtsp("rtsp://cam/1".into()), YoloParams::default())).await.unwrap();

        match next_event(&mut rx).await {
            StreamEvent::Error { message } => assert!(message.contains("camera unplugged")),
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(sources.opened.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_ends_a_running_stream() {
        let sources = Arc::new(FakeSources { frames: usize::MAX, opened: Mutex::new(vec![]), fail: false });
        let adapter = PipelineAdapter::new(sources, Arc::new(RecordingFactory::default()), Arc::new(PassThroughAnnotator));
        let mut rx = adapter.subscribe().await.unwrap();

        adapter.configure(config(StreamSource::Webcam(0), YoloParams::default())).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Frame(..)));

        adapter.stop().await.unwrap();
        loop {
            match next_event(&mut rx).await {
                StreamEvent::Frame(..) => continue,
                StreamEvent::Finished { source } => {
                    assert_eq!(source, "webcam:0");
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn new_configuration_replaces_the_stream_and_reloads_new_weights() {
        let sources = Arc::new(FakeSources { frames: usize::MAX, opened: Mutex::new(vec![]), fail: false });
        let detectors = Arc::new(RecordingFactory::default());
        let adapter = PipelineAdapter::new(sources.clone(), detectors.clone(), Arc::new(PassThroughAnnotator));
        let mut rx = adapter.subscribe().await.unwrap();

        adapter.configure(config(StreamSource::Webcam(0), YoloParams::default())).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Frame(..)));

        let mut replacement = config(StreamSource::Rtsp("rtsp://cam/2".into()), YoloParams::default());
        replacement.revision = 1;
        adapter.configure(replacement).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sources.opened.lock().unwrap().len() < 2 {
            assert!(Instant::now() < deadline, "replacement source was never opened");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(
            sources.opened.lock().unwrap().as_slice(),
            &[StreamSource::Webcam(0), StreamSource::Rtsp("rtsp://cam/2".into())]
        );
        assert_eq!(detectors.loads.lock().unwrap().len(), 2);
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn same_weights_are_not_reloaded_between_streams() {
        let sources = Arc::new(FakeSources { frames: usize::MAX, opened: Mutex::new(vec![]), fail: false });
        let detectors = Arc::new(RecordingFactory::default());
        let adapter = PipelineAdapter::new(sources.clone(), detectors.clone(), Arc::new(PassThroughAnnotator));
        let mut rx = adapter.subscribe().await.unwrap();

        adapter.configure(config(StreamSource::Webcam(0), YoloParams::default())).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, StreamEvent::Frame(..)));
        adapter.configure(config(StreamSource::Webcam(1), YoloParams::default())).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sources.opened.lock().unwrap().len() < 2 {
            assert!(Instant::now() < deadline, "replacement source was never opened");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(detectors.loads.lock().unwrap().len(), 1);
        adapter.stop().await.unwrap();
    }
}

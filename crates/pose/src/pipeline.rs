use crate::backend::InferenceBackend;
use crate::config::{PipelineConfig, PipelineMode};
use crate::detector::PersonDetector;
use crate::error::{PoseError, Result};
use crate::image_source::decode_image;
use crate::landmark_pool::LandmarkPool;
use crate::metrics::PipelineMetrics;
use crate::types::{Detection, Landmark, Pose, PoseLandmarks};
use preprocess::{CropPlan, Frame, ImageView};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

struct Stages {
    detector: Arc<Mutex<PersonDetector>>,
    landmarks: Option<Arc<LandmarkPool>>,
}

enum State {
    Uninitialized,
    Ready(Stages),
    Disposed,
}

/// Two-stage pose estimation: person boxes, then 33 landmarks per person.
///
/// Lifecycle: [`PosePipeline::new`], then [`PosePipeline::initialize`] (or
/// [`PosePipeline::initialize_with`] for injected engines), any number of
/// `detect*` calls, then [`PosePipeline::dispose`].
pub struct PosePipeline {
    config: PipelineConfig,
    state: State,
    metrics: PipelineMetrics,
}

impl PosePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: State::Uninitialized,
            metrics: PipelineMetrics::new("pose"),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Load the detector and one landmark engine per pool slot from the
    /// configured model paths.
    pub fn initialize<B: InferenceBackend + 'static>(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;

        let options = self.config.backend_options();
        let detector_path = self.config.detector_model_path.clone();
        let detector = load::<B>(&detector_path, &options)?;

        let mut landmark_backends: Vec<Box<dyn InferenceBackend>> = Vec::new();
        if self.config.mode == PipelineMode::Full {
            let slots = self.config.effective_pool_size();
            if slots < self.config.pool_size {
                tracing::info!(
                    engine_threads = self.config.engine_threads,
                    requested = self.config.pool_size,
                    "Engine is multithreaded, using a single landmark slot"
                );
            }
            let landmark_path = self.config.landmark_model_path().display().to_string();
            for _ in 0..slots {
                landmark_backends.push(load::<B>(&landmark_path, &options)?);
            }
        }

        self.initialize_with(detector, landmark_backends)
    }

    /// Initialize with already constructed engines. `landmark_backends` may be
    /// empty in boxes-only mode; otherwise each entry becomes one pool slot, up
    /// to [`PipelineConfig::effective_pool_size`]. Surplus engines are closed.
    pub fn initialize_with(
        &mut self,
        detector: Box<dyn InferenceBackend>,
        mut landmark_backends: Vec<Box<dyn InferenceBackend>>,
    ) -> Result<()> {
        self.ensure_uninitialized()?;

        let slots = self.config.effective_pool_size();
        if landmark_backends.len() > slots {
            tracing::info!(
                engine_threads = self.config.engine_threads,
                provided = landmark_backends.len(),
                slots,
                "More landmark engines than pool slots, closing the surplus"
            );
            for mut surplus in landmark_backends.drain(slots..) {
                surplus.close();
            }
        }

        let landmarks = match self.config.mode {
            PipelineMode::BoxesOnly => None,
            PipelineMode::Full => Some(Arc::new(LandmarkPool::new(
                landmark_backends,
                self.config.landmark_input_size,
            )?)),
        };

        tracing::info!(
            mode = ?self.config.mode,
            pool_size = landmarks.as_ref().map_or(0, |p| p.size()),
            "Pose pipeline initialized"
        );

        self.state = State::Ready(Stages {
            detector: Arc::new(Mutex::new(PersonDetector::new(
                detector,
                self.config.detector_input_size,
            ))),
            landmarks,
        });
        Ok(())
    }

    /// Detect poses in a decoded image.
    pub async fn detect(&self, image: &ImageView<'_>) -> Result<Vec<Pose>> {
        let stages = self.stages()?;
        let frame = image
            .to_frame()
            .map_err(|e| PoseError::InvalidImage(format!("{:#}", e)))?;
        self.run(stages, Arc::new(frame)).await
    }

    /// Detect poses in an already owned RGB frame.
    pub async fn detect_frame(&self, frame: Arc<Frame>) -> Result<Vec<Pose>> {
        let stages = self.stages()?;
        self.run(stages, frame).await
    }

    /// Detect poses in encoded image bytes. Bytes that fail to decode yield an
    /// empty list, like an image without people; use
    /// [`crate::decode_image`] first to tell the two apart.
    pub async fn detect_encoded(&self, bytes: &[u8]) -> Result<Vec<Pose>> {
        let stages = self.stages()?;
        let frame = match decode_image(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, bytes = bytes.len(), "Image decode failed");
                return Ok(Vec::new());
            }
        };
        self.run(stages, Arc::new(frame)).await
    }

    /// Release every engine. Later calls fail with [`PoseError::InvalidState`].
    pub async fn dispose(&mut self) {
        if let State::Ready(stages) = std::mem::replace(&mut self.state, State::Disposed) {
            let detector = stages.detector;
            let closed = tokio::task::spawn_blocking(move || {
                if let Ok(mut detector) = detector.lock() {
                    detector.close();
                }
            })
            .await;
            if let Err(e) = closed {
                tracing::warn!(error = %e, "Detector close task failed");
            }
            if let Some(pool) = stages.landmarks {
                pool.close().await;
            }
            tracing::info!("Pose pipeline disposed");
        }
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        match self.state {
            State::Uninitialized => Ok(()),
            State::Ready(_) => Err(PoseError::InvalidState("pipeline is already initialized")),
            State::Disposed => Err(PoseError::InvalidState("pipeline has been disposed")),
        }
    }

    fn stages(&self) -> Result<&Stages> {
        match &self.state {
            State::Ready(stages) => Ok(stages),
            State::Uninitialized => Err(PoseError::InvalidState("pipeline is not initialized")),
            State::Disposed => Err(PoseError::InvalidState("pipeline has been disposed")),
        }
    }

    /// Stage one on the blocking pool. Concurrent calls queue on the detector.
    async fn detect_persons(
        &self,
        stages: &Stages,
        frame: &Arc<Frame>,
    ) -> Result<Vec<Detection>> {
        let detector = Arc::clone(&stages.detector);
        let frame = Arc::clone(frame);
        let settings = self.config.detector;

        tokio::task::spawn_blocking(move || {
            let mut detector = detector
                .lock()
                .map_err(|_| PoseError::InvalidState("person detector lock poisoned"))?;
            detector.detect(&frame, &settings)
        })
        .await
        .map_err(|e| PoseError::InferenceFailure(anyhow::anyhow!("Detector task failed: {}", e)))?
    }

    async fn run(&self, stages: &Stages, frame: Arc<Frame>) -> Result<Vec<Pose>> {
        let start = Instant::now();
        let (width, height) = (frame.width(), frame.height());

        let detections = self.detect_persons(stages, &frame).await?;
        self.metrics
            .persons_detected
            .add(detections.len() as u64, &[]);

        let poses = match &stages.landmarks {
            Some(pool) if !detections.is_empty() => {
                self.attach_landmarks(pool, &frame, &detections).await
            }
            _ => detections
                .iter()
                .map(|d| Pose::from_detection(d, width, height))
                .collect(),
        };

        self.metrics.persons_emitted.add(poses.len() as u64, &[]);
        self.metrics
            .detect_duration
            .record(start.elapsed().as_secs_f64(), &[]);

        tracing::debug!(
            width,
            height,
            detections = detections.len(),
            poses = poses.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pose detection complete"
        );

        Ok(poses)
    }

    /// Run the landmark stage for every detection concurrently and compose the
    /// results in detection order.
    #[tracing::instrument(skip_all, fields(persons = detections.len()))]
    async fn attach_landmarks(
        &self,
        pool: &Arc<LandmarkPool>,
        frame: &Arc<Frame>,
        detections: &[Detection],
    ) -> Vec<Pose> {
        let (width, height) = (frame.width(), frame.height());

        let plans: Vec<CropPlan> = detections
            .iter()
            .map(|d| {
                CropPlan::for_box(
                    self.config.crop_mode,
                    &d.bbox,
                    self.config.crop_margin,
                    width,
                    height,
                    pool.input_size(),
                )
            })
            .collect();

        let handles: Vec<JoinHandle<Result<PoseLandmarks>>> = plans
            .iter()
            .map(|&plan| {
                let pool = Arc::clone(pool);
                let frame = Arc::clone(frame);
                tokio::spawn(async move { pool.run(frame, plan).await })
            })
            .collect();

        let mut poses = Vec::with_capacity(detections.len());
        for (index, ((detection, plan), handle)) in
            detections.iter().zip(&plans).zip(handles).enumerate()
        {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PoseError::InferenceFailure(anyhow::anyhow!(
                    "Landmark task failed: {}",
                    e
                ))),
            };

            match result {
                Ok(landmarks) if landmarks.score < self.config.min_landmark_score => {
                    tracing::debug!(
                        index,
                        score = landmarks.score,
                        "Landmark score below threshold, dropping person"
                    );
                    self.metrics.persons_rejected.add(1, &[]);
                }
                Ok(landmarks) => poses.push(Pose {
                    bounding_box: detection.bbox,
                    score: detection.score,
                    landmarks: to_image_space(&landmarks, plan, pool.input_size(), width, height),
                    image_width: width,
                    image_height: height,
                }),
                Err(e) => {
                    tracing::warn!(
                        index,
                        error = %e,
                        "Landmark extraction failed, keeping box only"
                    );
                    self.metrics.landmark_failures.add(1, &[]);
                    poses.push(Pose::from_detection(detection, width, height));
                }
            }
        }

        poses
    }
}

/// Map normalized crop landmarks through the crop's own inverse transform
/// and clamp them to the image.
fn to_image_space(
    landmarks: &PoseLandmarks,
    plan: &CropPlan,
    input_size: u32,
    width: u32,
    height: u32,
) -> Vec<Landmark> {
    landmarks
        .landmarks
        .iter()
        .map(|l| {
            let (x, y) = plan.transform.to_image(l.x, l.y, input_size);
            Landmark {
                x: x.clamp(0.0, width as f64),
                y: y.clamp(0.0, height as f64),
                ..*l
            }
        })
        .collect()
}

fn load<B: InferenceBackend + 'static>(
    path: &str,
    options: &crate::backend::BackendOptions,
) -> Result<Box<dyn InferenceBackend>> {
    tracing::info!(path, "Loading model");
    let backend = B::load_model(path, options).map_err(|e| PoseError::ModelLoad {
        path: path.to_string(),
        source: e.into(),
    })?;
    Ok(Box::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{
        MockBackend, SyntheticBox, detector_output, diagonal_points, landmark_output,
    };
    use crate::backend::InferenceOutput;
    use crate::types::LandmarkType;
    use preprocess::{BoundingBox, CropMode};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn ready(
        config: PipelineConfig,
        detector: MockBackend,
        landmarks: Vec<MockBackend>,
    ) -> PosePipeline {
        let mut pipeline = PosePipeline::new(config).unwrap();
        pipeline
            .initialize_with(
                Box::new(detector),
                landmarks
                    .into_iter()
                    .map(|b| Box::new(b) as Box<dyn InferenceBackend>)
                    .collect(),
            )
            .unwrap();
        pipeline
    }

    fn one_person() -> MockBackend {
        MockBackend::fixed(detector_output(
            &[SyntheticBox::person(320.0, 320.0, 160.0, 320.0, 0.9)],
            8400,
            true,
        ))
    }

    #[test]
    fn test_square_transform_maps_landmarks() {
        let landmarks = PoseLandmarks {
            landmarks: vec![Landmark {
                kind: LandmarkType::Nose,
                x: 0.5,
                y: 0.25,
                z: 0.3,
                visibility: 0.9,
            }],
            score: 0.9,
        };
        let plan = CropPlan::square(&BoundingBox::new(100.0, 100.0, 200.0, 300.0), 1.25);

        let mapped = to_image_space(&landmarks, &plan, 256, 640, 480);

        // side 250 centred on (150, 200): origin (25, 75)
        assert!((mapped[0].x - 150.0).abs() < 1e-9);
        assert!((mapped[0].y - 137.5).abs() < 1e-9);
        assert_eq!(mapped[0].z, 0.3);
        assert_eq!(mapped[0].visibility, 0.9);
    }

    #[test]
    fn test_landmarks_clamped_to_image() {
        let landmarks = PoseLandmarks {
            landmarks: vec![Landmark {
                kind: LandmarkType::Nose,
                x: 0.0,
                y: 1.0,
                z: 0.0,
                visibility: 1.0,
            }],
            score: 0.9,
        };
        // Crop hangs past the left and bottom edges
        let plan = CropPlan::square(&BoundingBox::new(0.0, 300.0, 100.0, 480.0), 1.25);

        let mapped = to_image_space(&landmarks, &plan, 256, 640, 480);
        assert_eq!(mapped[0].x, 0.0);
        assert_eq!(mapped[0].y, 480.0);
    }

    #[tokio::test]
    async fn test_full_mode_attaches_landmarks() {
        let pipeline = ready(
            PipelineConfig::default(),
            one_person(),
            vec![MockBackend::fixed(landmark_output(&diagonal_points(256), 0.9))],
        );
        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());

        let poses = pipeline.detect_frame(frame).await.unwrap();

        assert_eq!(poses.len(), 1);
        let pose = &poses[0];
        assert_eq!(pose.landmarks.len(), 33);
        assert_eq!((pose.image_width, pose.image_height), (640, 640));
        for landmark in &pose.landmarks {
            assert!((0.0..=640.0).contains(&landmark.x));
            assert!((0.0..=640.0).contains(&landmark.y));
        }
        // Diagonal points stay on the crop diagonal, which passes through the box centre
        let mid = pose.landmark(LandmarkType::LeftHip).unwrap();
        let (cx, cy) = pose.bounding_box.center();
        assert!((mid.x - mid.y - (cx - cy)).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_boxes_only_mode_skips_landmarks() {
        let config = PipelineConfig {
            mode: PipelineMode::BoxesOnly,
            ..PipelineConfig::default()
        };
        let pipeline = ready(config, one_person(), Vec::new());
        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());

        let poses = pipeline.detect_frame(frame).await.unwrap();
        assert_eq!(poses.len(), 1);
        assert!(poses[0].landmarks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_crop_falls_back_to_box() {
        let pipeline = ready(
            PipelineConfig::default(),
            one_person(),
            vec![MockBackend::failing("landmark engine down")],
        );
        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());

        let poses = pipeline.detect_frame(frame).await.unwrap();
        assert_eq!(poses.len(), 1);
        assert!(!poses[0].has_landmarks());
    }

    #[tokio::test]
    async fn test_letterbox_crop_mode_runs() {
        let config = PipelineConfig {
            crop_mode: CropMode::Letterbox,
            ..PipelineConfig::default()
        };
        let pipeline = ready(
            config,
            one_person(),
            vec![MockBackend::fixed(landmark_output(&diagonal_points(256), 0.9))],
        );
        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());

        let poses = pipeline.detect_frame(frame).await.unwrap();
        assert_eq!(poses[0].landmarks.len(), 33);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let mut pipeline = PosePipeline::new(PipelineConfig::default()).unwrap();
        let pixels = vec![0u8; 8 * 8 * 3];
        let view = ImageView::rgb(&pixels, 8, 8);

        assert!(matches!(
            pipeline.detect(&view).await,
            Err(PoseError::InvalidState(_))
        ));
        assert!(matches!(
            pipeline.detect_encoded(b"junk").await,
            Err(PoseError::InvalidState(_))
        ));

        pipeline
            .initialize_with(
                Box::new(one_person()),
                vec![Box::new(MockBackend::fixed(landmark_output(
                    &diagonal_points(256),
                    0.9,
                )))],
            )
            .unwrap();
        assert!(pipeline.is_ready());
        assert!(matches!(
            pipeline.initialize_with(Box::new(one_person()), Vec::new()),
            Err(PoseError::InvalidState(_))
        ));

        pipeline.dispose().await;
        assert!(matches!(
            pipeline.detect(&view).await,
            Err(PoseError::InvalidState(_))
        ));
        assert!(matches!(
            pipeline.initialize_with(Box::new(one_person()), Vec::new()),
            Err(PoseError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_full_mode_requires_landmark_engines() {
        let mut pipeline = PosePipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline
            .initialize_with(Box::new(one_person()), Vec::new())
            .unwrap_err();
        assert!(matches!(err, PoseError::InvalidConfig(_)));
        assert!(!pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_detect_encoded_is_lenient() {
        let pipeline = ready(
            PipelineConfig::default(),
            one_person(),
            vec![MockBackend::fixed(landmark_output(&diagonal_points(256), 0.9))],
        );
        let poses = pipeline.detect_encoded(b"not an image").await.unwrap();
        assert!(poses.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = PipelineConfig {
            pool_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            PosePipeline::new(config),
            Err(PoseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_initialize_reports_model_load_failure() {
        let mut pipeline = PosePipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.initialize::<MockBackend>().unwrap_err();
        assert!(matches!(err, PoseError::ModelLoad { .. }));
        assert!(!pipeline.is_ready());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_detection_does_not_block_the_runtime() {
        let ticked = Arc::new(AtomicBool::new(false));
        let ticked_during_inference = Arc::new(AtomicBool::new(false));

        let detector = {
            let ticked = Arc::clone(&ticked);
            let seen = Arc::clone(&ticked_during_inference);
            MockBackend::new(move |_| {
                std::thread::sleep(Duration::from_millis(200));
                seen.store(ticked.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(detector_output(
                    &[SyntheticBox::person(320.0, 320.0, 160.0, 320.0, 0.9)],
                    8400,
                    true,
                ))
            })
        };
        let config = PipelineConfig {
            mode: PipelineMode::BoxesOnly,
            ..PipelineConfig::default()
        };
        let pipeline = ready(config, detector, Vec::new());

        let ticker = {
            let ticked = Arc::clone(&ticked);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticked.store(true, Ordering::SeqCst);
            })
        };

        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());
        let poses = pipeline.detect_frame(frame).await.unwrap();
        ticker.await.unwrap();

        assert_eq!(poses.len(), 1);
        assert!(
            ticked_during_inference.load(Ordering::SeqCst),
            "Other tasks should keep running while the detector infers"
        );
    }

    /// Counts `close` calls on its engines.
    struct CountingBackend {
        closed: Arc<AtomicUsize>,
    }

    impl InferenceBackend for CountingBackend {
        fn load_model(
            path: &str,
            _options: &crate::backend::BackendOptions,
        ) -> anyhow::Result<Self> {
            anyhow::bail!("cannot load {}", path)
        }

        fn infer(&mut self, _input: &ndarray::ArrayD<f32>) -> anyhow::Result<InferenceOutput> {
            Ok(landmark_output(&diagonal_points(256), 0.9))
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_multithreaded_engine_gets_single_slot() {
        let config = PipelineConfig {
            engine_threads: 4,
            pool_size: 3,
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_pool_size(), 1);

        let closed = Arc::new(AtomicUsize::new(0));
        let engines: Vec<Box<dyn InferenceBackend>> = (0..3)
            .map(|_| {
                Box::new(CountingBackend {
                    closed: Arc::clone(&closed),
                }) as Box<dyn InferenceBackend>
            })
            .collect();

        let mut pipeline = PosePipeline::new(config).unwrap();
        pipeline
            .initialize_with(Box::new(one_person()), engines)
            .unwrap();

        let slots = match &pipeline.state {
            State::Ready(stages) => stages.landmarks.as_ref().map(|p| p.size()),
            _ => None,
        };
        assert_eq!(slots, Some(1));
        assert_eq!(closed.load(Ordering::SeqCst), 2, "Surplus engines are closed");

        let frame = Arc::new(Frame::filled(640, 640, [90, 90, 90]).unwrap());
        assert_eq!(pipeline.detect_frame(frame).await.unwrap()[0].landmarks.len(), 33);

        pipeline.dispose().await;
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }
}

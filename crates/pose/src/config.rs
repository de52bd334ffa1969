use crate::backend::{BackendOptions, ExecutionProvider};
use crate::error::{PoseError, Result};
use common::{env_flag, env_opt, env_or};
use preprocess::{CropMode, DEFAULT_CROP_MARGIN, DEFAULT_INPUT_SIZE, DEFAULT_LANDMARK_INPUT_SIZE};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use common::Environment;

pub const MAX_POOL_SIZE: usize = 16;

/// The three interchangeable BlazePose landmark models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LandmarkVariant {
    Lite,
    #[default]
    Full,
    Heavy,
}

impl LandmarkVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkVariant::Lite => "lite",
            LandmarkVariant::Full => "full",
            LandmarkVariant::Heavy => "heavy",
        }
    }

    pub fn file_name(&self) -> String {
        format!("pose_landmark_{}.onnx", self.as_str())
    }
}

impl FromStr for LandmarkVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lite" => Ok(LandmarkVariant::Lite),
            "full" => Ok(LandmarkVariant::Full),
            "heavy" => Ok(LandmarkVariant::Heavy),
            other => Err(format!("unknown landmark variant '{}'", other)),
        }
    }
}

impl fmt::Display for LandmarkVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Boxes plus 33 landmarks per person.
    #[default]
    Full,
    /// Person boxes only; the landmark stage is never loaded.
    BoxesOnly,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(PipelineMode::Full),
            "boxes" | "boxes-only" | "boxes_only" => Ok(PipelineMode::BoxesOnly),
            other => Err(format!("unknown pipeline mode '{}'", other)),
        }
    }
}

fn parse_crop_mode(value: &str) -> Option<CropMode> {
    match value.trim().to_lowercase().as_str() {
        "square" => Some(CropMode::Square),
        "letterbox" => Some(CropMode::Letterbox),
        _ => None,
    }
}

/// Thresholds handed to the person detector on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: usize,
    /// Explicit pre-NMS cap; `None` scales it with the image area.
    pub pre_nms_top_k: Option<usize>,
    pub person_only: bool,
    pub person_class_id: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 10,
            pre_nms_top_k: None,
            person_only: true,
            person_class_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub detector_model_path: String,
    pub landmark_model_dir: String,
    pub landmark_model_path: Option<String>,
    pub landmark_variant: LandmarkVariant,
    pub detector_input_size: (u32, u32),
    pub landmark_input_size: u32,
    pub detector: DetectorSettings,
    pub min_landmark_score: f64,
    pub pool_size: usize,
    pub engine_threads: usize,
    pub execution_provider: ExecutionProvider,
    pub mode: PipelineMode,
    pub crop_mode: CropMode,
    pub crop_margin: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            otel_endpoint: None,
            detector_model_path: "models/yolov8n.onnx".to_string(),
            landmark_model_dir: "models".to_string(),
            landmark_model_path: None,
            landmark_variant: LandmarkVariant::default(),
            detector_input_size: DEFAULT_INPUT_SIZE,
            landmark_input_size: DEFAULT_LANDMARK_INPUT_SIZE,
            detector: DetectorSettings::default(),
            min_landmark_score: 0.5,
            pool_size: 2,
            engine_threads: 1,
            execution_provider: ExecutionProvider::Cpu,
            mode: PipelineMode::Full,
            crop_mode: CropMode::Square,
            crop_margin: DEFAULT_CROP_MARGIN,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let otel_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let detector = DetectorSettings {
            confidence_threshold: env_or(
                "CONFIDENCE_THRESHOLD",
                defaults.detector.confidence_threshold,
            ),
            iou_threshold: env_or("IOU_THRESHOLD", defaults.detector.iou_threshold),
            max_detections: env_or("MAX_DETECTIONS", defaults.detector.max_detections),
            pre_nms_top_k: env_opt("PRE_NMS_TOP_K"),
            person_only: env_flag("PERSON_ONLY", defaults.detector.person_only),
            person_class_id: env_or("PERSON_CLASS_ID", defaults.detector.person_class_id),
        };

        Self {
            environment: Environment::from_env(),
            otel_endpoint,
            detector_model_path: env_or("DETECTOR_MODEL_PATH", defaults.detector_model_path),
            landmark_model_dir: env_or("LANDMARK_MODEL_DIR", defaults.landmark_model_dir),
            landmark_model_path: env_opt("LANDMARK_MODEL_PATH"),
            landmark_variant: env_or("LANDMARK_VARIANT", defaults.landmark_variant),
            detector_input_size: (
                env_or("DETECTOR_INPUT_WIDTH", defaults.detector_input_size.0),
                env_or("DETECTOR_INPUT_HEIGHT", defaults.detector_input_size.1),
            ),
            landmark_input_size: env_or("LANDMARK_INPUT_SIZE", defaults.landmark_input_size),
            detector,
            min_landmark_score: env_or("MIN_LANDMARK_SCORE", defaults.min_landmark_score),
            pool_size: env_or("POOL_SIZE", defaults.pool_size),
            engine_threads: env_or("ENGINE_THREADS", defaults.engine_threads),
            execution_provider: env_or("EXECUTION_PROVIDER", defaults.execution_provider),
            mode: env_or("PIPELINE_MODE", defaults.mode),
            crop_mode: env::var("CROP_MODE")
                .ok()
                .and_then(|s| parse_crop_mode(&s))
                .unwrap_or(defaults.crop_mode),
            crop_margin: env_or("CROP_MARGIN", defaults.crop_margin),
        }
    }

    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if !(0.0..=1.0).contains(&d.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold must be in [0, 1], got {}",
                d.confidence_threshold
            ));
        }
        if !(d.iou_threshold > 0.0 && d.iou_threshold < 1.0) {
            return invalid(format!(
                "iou_threshold must be in (0, 1), got {}",
                d.iou_threshold
            ));
        }
        if d.max_detections == 0 {
            return invalid("max_detections must be at least 1".to_string());
        }
        if d.pre_nms_top_k == Some(0) {
            return invalid("pre_nms_top_k must be at least 1 when set".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_landmark_score) {
            return invalid(format!(
                "min_landmark_score must be in [0, 1], got {}",
                self.min_landmark_score
            ));
        }
        if !(1..=MAX_POOL_SIZE).contains(&self.pool_size) {
            return invalid(format!(
                "pool_size must be in 1..={}, got {}",
                MAX_POOL_SIZE, self.pool_size
            ));
        }
        if self.engine_threads == 0 {
            return invalid("engine_threads must be at least 1".to_string());
        }
        if self.detector_input_size.0 == 0 || self.detector_input_size.1 == 0 {
            return invalid(format!(
                "detector input size must be non-zero, got {:?}",
                self.detector_input_size
            ));
        }
        if self.landmark_input_size == 0 {
            return invalid("landmark_input_size must be non-zero".to_string());
        }
        if !(self.crop_margin >= 1.0 && self.crop_margin.is_finite()) {
            return invalid(format!(
                "crop_margin must be at least 1, got {}",
                self.crop_margin
            ));
        }
        Ok(())
    }

    /// Landmark slots actually created. An engine that multithreads internally
    /// gets a single slot.
    pub fn effective_pool_size(&self) -> usize {
        if self.engine_threads > 1 {
            1
        } else {
            self.pool_size
        }
    }

    pub fn landmark_model_path(&self) -> PathBuf {
        match &self.landmark_model_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.landmark_model_dir).join(self.landmark_variant.file_name()),
        }
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            intra_threads: self.engine_threads,
            provider: self.execution_provider,
        }
    }
}

fn invalid(message: String) -> Result<()> {
    Err(PoseError::InvalidConfig(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "CONFIDENCE_THRESHOLD",
        "POOL_SIZE",
        "ENGINE_THREADS",
        "LANDMARK_VARIANT",
        "LANDMARK_MODEL_DIR",
        "LANDMARK_MODEL_PATH",
        "PIPELINE_MODE",
        "CROP_MODE",
        "PRE_NMS_TOP_K",
        "PERSON_ONLY",
    ];

    fn clear() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.effective_pool_size(), 2);
        assert_eq!(
            config.landmark_model_path(),
            PathBuf::from("models/pose_landmark_full.onnx")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        unsafe {
            env::set_var("CONFIDENCE_THRESHOLD", "0.7");
            env::set_var("POOL_SIZE", "4");
            env::set_var("LANDMARK_VARIANT", "HEAVY");
            env::set_var("LANDMARK_MODEL_DIR", "/opt/models");
            env::set_var("PIPELINE_MODE", "boxes");
            env::set_var("CROP_MODE", "letterbox");
            env::set_var("PRE_NMS_TOP_K", "50");
            env::set_var("PERSON_ONLY", "false");
        }

        let config = PipelineConfig::from_env();
        assert_eq!(config.detector.confidence_threshold, 0.7);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.landmark_variant, LandmarkVariant::Heavy);
        assert_eq!(
            config.landmark_model_path(),
            PathBuf::from("/opt/models/pose_landmark_heavy.onnx")
        );
        assert_eq!(config.mode, PipelineMode::BoxesOnly);
        assert_eq!(config.crop_mode, CropMode::Letterbox);
        assert_eq!(config.detector.pre_nms_top_k, Some(50));
        assert!(!config.detector.person_only);

        unsafe { env::set_var("LANDMARK_MODEL_PATH", "/tmp/custom.onnx") };
        assert_eq!(
            PipelineConfig::from_env().landmark_model_path(),
            PathBuf::from("/tmp/custom.onnx")
        );
        clear();
    }

    #[test]
    #[serial]
    fn test_unparsable_values_fall_back() {
        clear();
        unsafe {
            env::set_var("POOL_SIZE", "lots");
            env::set_var("LANDMARK_VARIANT", "ultra");
            env::set_var("CROP_MODE", "circle");
        }

        let config = PipelineConfig::from_env();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.landmark_variant, LandmarkVariant::Full);
        assert_eq!(config.crop_mode, CropMode::Square);
        clear();
    }

    #[test]
    fn test_engine_threads_force_single_slot() {
        let config = PipelineConfig {
            engine_threads: 4,
            pool_size: 3,
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_pool_size(), 1);
        assert_eq!(config.backend_options().intra_threads, 4);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let base = PipelineConfig::default();

        let mut config = base.clone();
        config.detector.confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(PoseError::InvalidConfig(_))));

        let mut config = base.clone();
        config.detector.iou_threshold = 1.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.detector.max_detections = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.pool_size = 0;
        assert!(config.validate().is_err());
        config.pool_size = MAX_POOL_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.min_landmark_score = -0.1;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.crop_margin = 0.5;
        assert!(config.validate().is_err());

        let mut config = base;
        config.landmark_input_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Boxes-Only".parse(), Ok(PipelineMode::BoxesOnly));
        assert_eq!("full".parse(), Ok(PipelineMode::Full));
        assert!("other".parse::<PipelineMode>().is_err());
        assert_eq!(LandmarkVariant::Lite.file_name(), "pose_landmark_lite.onnx");
    }
}

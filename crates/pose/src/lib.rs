pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod image_source;
pub mod landmark_pool;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod processing;
pub mod types;

// Re-export commonly used types for convenience
pub use backend::{BackendOptions, ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::{DetectorSettings, LandmarkVariant, PipelineConfig, PipelineMode};
pub use detector::PersonDetector;
pub use error::{PoseError, Result};
pub use image_source::{decode_image, load_image};
pub use landmark_pool::LandmarkPool;
pub use pipeline::PosePipeline;
pub use types::{Detection, Landmark, LandmarkType, Pose, PoseLandmarks, RawDetection};

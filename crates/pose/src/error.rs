use thiserror::Error;

/// Everything the pose pipeline can fail with.
///
/// "No people found" is never an error: stages return an empty list for it.
#[derive(Debug, Error)]
pub enum PoseError {
    /// Called before `initialize` or after `dispose`.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Preprocessing failed: {0:#}")]
    Preprocessing(anyhow::Error),

    /// The model produced a tensor the decoders cannot interpret.
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Inference failed: {0:#}")]
    InferenceFailure(anyhow::Error),

    #[error("Failed to load model {path}")]
    ModelLoad {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, PoseError>;

use ndarray::{Array, ArrayD, IxDyn};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(any(test, feature = "mock-backend"))]
pub mod mock;

/// Where the engine executes. Only meaningful to backends that support a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => Err(format!("unknown execution provider '{}'", other)),
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => write!(f, "cpu"),
            ExecutionProvider::Cuda => write!(f, "cuda"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Intra-op threads used by one engine instance.
    pub intra_threads: usize,
    pub provider: ExecutionProvider,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            intra_threads: 1,
            provider: ExecutionProvider::Cpu,
        }
    }
}

/// One loaded model. Instances are never shared between concurrent callers;
/// the landmark pool gives each slot its own.
pub trait InferenceBackend: Send {
    fn load_model(path: &str, options: &BackendOptions) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the model on a single input tensor.
    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Release engine resources. Further `infer` calls may fail.
    fn close(&mut self) {}
}

/// Output tensors in the model's declared output order.
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    pub tensors: Vec<ArrayD<f32>>,
}

impl InferenceOutput {
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Self { tensors }
    }
}

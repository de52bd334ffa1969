use super::{BackendOptions, ExecutionProvider, InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// ONNX Runtime session for a single-input model.
pub struct OrtBackend {
    session: Option<Session>,
    path: String,
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, options: &BackendOptions) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads.max(1))?;

        match options.provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::debug!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!(
            path,
            threads = options.intra_threads,
            provider = %options.provider,
            "Model loaded"
        );
        Ok(Self {
            session: Some(session),
            path: path.to_string(),
        })
    }

    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Session for {} is closed", self.path))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for index in 0..outputs.len() {
            tensors.push(outputs[index].try_extract_array::<f32>()?.into_owned());
        }

        Ok(InferenceOutput { tensors })
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!(path = %self.path, "Session closed");
        }
    }
}

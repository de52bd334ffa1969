use crate::backend::InferenceBackend;
use crate::error::{PoseError, Result};
use crate::processing::landmarks::LandmarkDecoder;
use crate::types::PoseLandmarks;
use preprocess::{CropPlan, CropPreProcessor, Frame, TensorLayout};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// One engine plus the buffers only it touches.
struct Slot {
    backend: Box<dyn InferenceBackend>,
    preprocessor: CropPreProcessor,
    decoder: LandmarkDecoder,
}

impl Slot {
    fn run(&mut self, frame: &Frame, plan: &CropPlan) -> Result<PoseLandmarks> {
        let input = self
            .preprocessor
            .preprocess(frame, plan)
            .map_err(PoseError::Preprocessing)?;
        let output = self
            .backend
            .infer(input)
            .map_err(PoseError::InferenceFailure)?;
        self.decoder.decode(&output.tensors)
    }
}

/// Fixed set of landmark engines shared by concurrent callers.
///
/// Calls are assigned to slots round-robin. Each slot sits behind its own
/// fair (FIFO) lock, so at most one inference runs per slot and up to
/// `size()` run in parallel.
pub struct LandmarkPool {
    slots: Vec<Arc<Mutex<Slot>>>,
    next: AtomicUsize,
    input_size: u32,
}

impl LandmarkPool {
    pub fn new(backends: Vec<Box<dyn InferenceBackend>>, input_size: u32) -> Result<Self> {
        if backends.is_empty() {
            return Err(PoseError::InvalidConfig(
                "landmark pool needs at least one engine".to_string(),
            ));
        }

        let slots = backends
            .into_iter()
            .map(|backend| {
                Arc::new(Mutex::new(Slot {
                    backend,
                    preprocessor: CropPreProcessor::new(input_size, TensorLayout::Nhwc),
                    decoder: LandmarkDecoder::new(input_size),
                }))
            })
            .collect::<Vec<_>>();

        tracing::debug!(slots = slots.len(), input_size, "Landmark pool ready");

        Ok(Self {
            slots,
            next: AtomicUsize::new(0),
            input_size,
        })
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Crop, infer and decode one person. Waits if the assigned slot is busy.
    pub async fn run(&self, frame: Arc<Frame>, plan: CropPlan) -> Result<PoseLandmarks> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut slot = Arc::clone(&self.slots[index]).lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let _s = common::span_debug!("landmark_crop", slot = index);
            slot.run(&frame, &plan)
        })
        .await
        .map_err(|e| PoseError::InferenceFailure(anyhow::anyhow!("Landmark task failed: {}", e)))?
    }

    /// Close every engine, waiting for in-flight inferences first.
    pub async fn close(&self) {
        for slot in &self.slots {
            slot.lock().await.backend.close();
        }
    }
}

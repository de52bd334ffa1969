use crate::backend::InferenceBackend;
use crate::config::DetectorSettings;
use crate::error::{PoseError, Result};
use crate::processing::{decode::DetectionDecoder, nms};
use crate::types::Detection;
use common::span;
use preprocess::{BoundingBox, Frame, LetterboxPreProcessor, TensorLayout, clamp_to_image};

/// Candidates kept before NMS for a 640x640 image.
const BASELINE_TOP_K: f64 = 100.0;
const BASELINE_AREA: f64 = 640.0 * 640.0;
const MIN_TOP_K: usize = 20;
const MAX_TOP_K: usize = 200;

/// Pre-NMS candidate cap scaled by image area, clamped to `[20, 200]`.
pub fn dynamic_top_k(width: u32, height: u32) -> usize {
    let area_ratio = (width as f64 * height as f64) / BASELINE_AREA;
    ((BASELINE_TOP_K * area_ratio).round() as usize).clamp(MIN_TOP_K, MAX_TOP_K)
}

/// Stage one: letterbox, run the detector, decode, cap, suppress and map the
/// surviving boxes back to the source image.
pub struct PersonDetector {
    backend: Box<dyn InferenceBackend>,
    preprocessor: LetterboxPreProcessor,
    decoder: DetectionDecoder,
}

impl PersonDetector {
    pub fn new(backend: Box<dyn InferenceBackend>, input_size: (u32, u32)) -> Self {
        Self {
            backend,
            preprocessor: LetterboxPreProcessor::new(input_size, TensorLayout::Nchw),
            decoder: DetectionDecoder::new(input_size),
        }
    }

    pub fn detect(&mut self, frame: &Frame, settings: &DetectorSettings) -> Result<Vec<Detection>> {
        let (width, height) = (frame.width(), frame.height());
        let _s = span!("person_detect", width, height);

        let (input, plan) = self
            .preprocessor
            .preprocess(frame)
            .map_err(PoseError::Preprocessing)?;

        let output = {
            let _infer_span = tracing::info_span!("model_inference").entered();
            self.backend
                .infer(input)
                .map_err(PoseError::InferenceFailure)?
        };

        let mut candidates = self
            .decoder
            .decode(&output.tensors, settings.confidence_threshold)?;
        if candidates.is_empty() {
            tracing::trace!("No candidates above confidence threshold");
            return Ok(Vec::new());
        }

        let top_k = settings
            .pre_nms_top_k
            .unwrap_or_else(|| dynamic_top_k(width, height));
        if candidates.len() > top_k {
            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
            candidates.truncate(top_k);
        }

        let kept = nms::suppress(&candidates, settings.iou_threshold, settings.max_detections);

        let detections: Vec<Detection> = kept
            .into_iter()
            .filter(|d| !settings.person_only || d.class_id == settings.person_class_id)
            .filter_map(|d| {
                let bbox = plan.inverse_box(&BoundingBox::from_xyxy(d.bbox));
                let bbox = clamp_to_image(&bbox, width, height);
                bbox.is_valid().then_some(Detection {
                    class_id: d.class_id,
                    score: d.score,
                    bbox,
                })
            })
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            top_k,
            detections = detections.len(),
            "Person detection complete"
        );

        Ok(detections)
    }

    pub fn close(&mut self) {
        self.backend.close();
    }
}

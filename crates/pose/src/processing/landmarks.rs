use super::sigmoid;
use crate::error::{PoseError, Result};
use crate::types::{Landmark, LandmarkType, NUM_LANDMARKS, PoseLandmarks};
use ndarray::ArrayD;
use std::borrow::Cow;

/// Values per keypoint: x, y, z, visibility logit, presence logit.
const VALUES_PER_POINT: usize = 5;

/// Decodes BlazePose landmark outputs into normalized crop coordinates.
///
/// Tensor 0 holds the keypoints (39 points in the stock models, of which the
/// first 33 are body landmarks), tensor 1 the pose score logit. Any further
/// outputs (segmentation, heatmap) are ignored.
#[derive(Debug, Clone, Copy)]
pub struct LandmarkDecoder {
    pub input_size: u32,
}

impl LandmarkDecoder {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    #[tracing::instrument(level = "debug", skip(self, tensors))]
    pub fn decode(&self, tensors: &[ArrayD<f32>]) -> Result<PoseLandmarks> {
        let [points, score, ..] = tensors else {
            return Err(PoseError::MalformedModelOutput(format!(
                "landmark model produced {} outputs, expected at least 2",
                tensors.len()
            )));
        };

        let flat: Cow<'_, [f32]> = match points.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(points.iter().copied().collect()),
        };
        if flat.len() < NUM_LANDMARKS * VALUES_PER_POINT || flat.len() % VALUES_PER_POINT != 0 {
            return Err(PoseError::MalformedModelOutput(format!(
                "landmark tensor has {} values, expected a multiple of {} covering {} points",
                flat.len(),
                VALUES_PER_POINT,
                NUM_LANDMARKS
            )));
        }

        let score_logit = score.iter().next().copied().ok_or_else(|| {
            PoseError::MalformedModelOutput("landmark score tensor is empty".to_string())
        })?;

        let size = self.input_size as f64;
        let landmarks = flat
            .chunks_exact(VALUES_PER_POINT)
            .zip(LandmarkType::ALL)
            .map(|(v, kind)| Landmark {
                kind,
                x: (v[0] as f64 / size).clamp(0.0, 1.0),
                y: (v[1] as f64 / size).clamp(0.0, 1.0),
                z: v[2] as f64,
                visibility: (sigmoid(v[3] as f64) * sigmoid(v[4] as f64)).clamp(0.0, 1.0),
            })
            .collect();

        Ok(PoseLandmarks {
            landmarks,
            score: sigmoid(score_logit as f64),
        })
    }
}

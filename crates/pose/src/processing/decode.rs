//! YOLO detector output decoding.
//!
//! Export toolchains disagree on the output layout: the same model may come
//! out as `[1, 84, N]` or `[1, N, 84]`, with or without an objectness channel,
//! with boxes in input pixels or normalized to `[0, 1]`. The decoder accepts
//! all of these.

use super::sigmoid;
use crate::error::{PoseError, Result};
use crate::types::RawDetection;
use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use preprocess::cxcywh_to_xyxy;

/// Smallest channel count: four box values plus 80 COCO classes.
pub const MIN_CHANNELS: usize = 84;
/// Channel count of exports that carry an objectness logit before the classes.
pub const OBJECTNESS_CHANNELS: usize = 85;
/// A median box width at or below this means the boxes are normalized.
const NORMALIZED_WIDTH_LIMIT: f64 = 2.0;

pub struct DetectionDecoder {
    pub input_width: u32,
    pub input_height: u32,
}

impl DetectionDecoder {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_width: input_size.0,
            input_height: input_size.1,
        }
    }

    /// Decode every output tensor into candidates scoring at least
    /// `confidence_threshold`, boxes in model-input pixels.
    ///
    /// An empty result is a normal outcome. A shape the decoder cannot
    /// interpret is [`PoseError::MalformedModelOutput`].
    pub fn decode(
        &self,
        tensors: &[ArrayD<f32>],
        confidence_threshold: f64,
    ) -> Result<Vec<RawDetection>> {
        let _s = common::span_debug!("decode", tensors = tensors.len());

        let matrices = tensors
            .iter()
            .map(orient)
            .collect::<Result<Vec<_>>>()?;

        let channels = match matrices.first() {
            Some(m) => m.ncols(),
            None => {
                return Err(PoseError::MalformedModelOutput(
                    "detector produced no output tensors".to_string(),
                ));
            }
        };
        if let Some(other) = matrices.iter().find(|m| m.ncols() != channels) {
            return Err(PoseError::MalformedModelOutput(format!(
                "output tensors disagree on channel count ({} vs {})",
                channels,
                other.ncols()
            )));
        }

        let total_rows: usize = matrices.iter().map(|m| m.nrows()).sum();
        if total_rows == 0 || channels < MIN_CHANNELS {
            return Err(PoseError::MalformedModelOutput(format!(
                "unexpected output shape: {} rows of {} channels, need at least {} channels",
                total_rows, channels, MIN_CHANNELS
            )));
        }

        let has_objectness = channels == OBJECTNESS_CHANNELS;
        let class_offset = if has_objectness { 5 } else { 4 };

        let mut kept: Vec<(usize, f64, [f64; 4])> = Vec::new();
        for matrix in &matrices {
            for row in matrix.rows() {
                let Some((class_id, class_logit)) = argmax(row.iter().skip(class_offset)) else {
                    continue;
                };

                let mut score = sigmoid(class_logit as f64);
                if has_objectness {
                    score *= sigmoid(row[4] as f64);
                }
                if score.is_nan() || score < confidence_threshold {
                    continue;
                }

                let bbox = [row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64];
                if bbox.iter().any(|v| !v.is_finite()) {
                    continue;
                }
                kept.push((class_id, score, bbox));
            }
        }

        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let widths: Vec<f64> = kept.iter().map(|(_, _, b)| b[2]).collect();
        let normalized = median(widths) <= NORMALIZED_WIDTH_LIMIT;
        let (sx, sy) = if normalized {
            (self.input_width as f64, self.input_height as f64)
        } else {
            (1.0, 1.0)
        };

        tracing::trace!(
            candidates = kept.len(),
            total_rows,
            channels,
            normalized,
            "Decoded detector output"
        );

        Ok(kept
            .into_iter()
            .map(|(class_id, score, [cx, cy, w, h])| RawDetection {
                class_id,
                score,
                bbox: cxcywh_to_xyxy(cx * sx, cy * sy, w * sx, h * sy),
            })
            .collect())
    }
}

/// Strip leading unit axes and return a `[rows, channels]` view.
///
/// A `[84|85, N]` slice with fewer rows than columns is the transposed export
/// and is flipped.
fn orient(tensor: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>> {
    let mut view = tensor.view();
    while view.ndim() > 2 && view.shape()[0] == 1 {
        view = view.index_axis_move(Axis(0), 0);
    }

    let view = view.into_dimensionality::<Ix2>().map_err(|_| {
        PoseError::MalformedModelOutput(format!(
            "unexpected output rank: shape {:?}",
            tensor.shape()
        ))
    })?;

    let (rows, cols) = view.dim();
    if rows < cols && (rows == MIN_CHANNELS || rows == OBJECTNESS_CHANNELS) {
        Ok(view.reversed_axes())
    } else {
        Ok(view)
    }
}

/// Index and value of the first maximum, ignoring non-finite values.
fn argmax<'a>(values: impl Iterator<Item = &'a f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{SyntheticBox, detector_output, logit};
    use ndarray::IxDyn;

    fn decoder() -> DetectionDecoder {
        DetectionDecoder::new((640, 640))
    }

    #[test]
    fn test_transposed_and_plain_decode_identically() {
        let boxes = [
            SyntheticBox::person(320.0, 240.0, 100.0, 300.0, 0.9),
            SyntheticBox {
                class_id: 2,
                ..SyntheticBox::person(100.0, 100.0, 50.0, 40.0, 0.7)
            },
        ];
        let transposed = detector_output(&boxes, 8400, true);
        let plain = detector_output(&boxes, 8400, false);
        assert_eq!(transposed.tensors[0].shape(), &[1, 84, 8400]);
        assert_eq!(plain.tensors[0].shape(), &[1, 8400, 84]);

        let a = decoder().decode(&transposed.tensors, 0.5).unwrap();
        let b = decoder().decode(&plain.tensors, 0.5).unwrap();

        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert_eq!(a[0].class_id, 0);
        assert_eq!(a[1].class_id, 2);
        assert!((a[0].score - 0.9).abs() < 1e-5);
        let [x1, y1, x2, y2] = a[0].bbox;
        assert!((x1 - 270.0).abs() < 1e-4);
        assert!((y1 - 90.0).abs() < 1e-4);
        assert!((x2 - 370.0).abs() < 1e-4);
        assert!((y2 - 390.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalized_boxes_are_scaled() {
        let boxes = [SyntheticBox::person(0.5, 0.25, 0.1, 0.2, 0.8)];
        let out = detector_output(&boxes, 100, true);

        let decoded = DetectionDecoder::new((640, 480))
            .decode(&out.tensors, 0.5)
            .unwrap();

        assert_eq!(decoded.len(), 1);
        let [x1, y1, x2, y2] = decoded[0].bbox;
        assert!((x1 - 288.0).abs() < 1e-3);
        assert!((x2 - 352.0).abs() < 1e-3);
        assert!((y1 - 72.0).abs() < 1e-3);
        assert!((y2 - 168.0).abs() < 1e-3);
    }

    #[test]
    fn test_objectness_multiplies_class_score() {
        // [1, 2, 85]: objectness 0.5, class score 0.8 -> 0.4
        let mut data = vec![-12.0f32; 2 * 85];
        data[..4].copy_from_slice(&[100.0, 100.0, 20.0, 40.0]);
        data[4] = logit(0.5);
        data[5 + 3] = logit(0.8);
        let tensor = ArrayD::from_shape_vec(IxDyn(&[1, 2, 85]), data).unwrap();

        let decoded = decoder().decode(&[tensor.clone()], 0.3).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].class_id, 3);
        assert!((decoded[0].score - 0.4).abs() < 1e-5);

        assert!(decoder().decode(&[tensor], 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_transposed_objectness_layout() {
        // [1, 85, 100]: channel-major with objectness, one live anchor
        let anchors = 100;
        let mut data = vec![-12.0f32; 85 * anchors];
        let anchor = 1;
        for (channel, value) in [200.0, 150.0, 40.0, 80.0].into_iter().enumerate() {
            data[channel * anchors + anchor] = value;
        }
        data[4 * anchors + anchor] = logit(0.9);
        data[(5 + 7) * anchors + anchor] = logit(0.5);
        let tensor = ArrayD::from_shape_vec(IxDyn(&[1, 85, anchors]), data).unwrap();

        let decoded = decoder().decode(&[tensor.clone()], 0.3).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].class_id, 7);
        assert!((decoded[0].score - 0.45).abs() < 1e-5);
        assert_eq!(decoded[0].bbox, [180.0, 110.0, 220.0, 190.0]);

        let row_major = tensor
            .view()
            .reversed_axes()
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&[1, anchors, 85]))
            .unwrap();
        assert_eq!(decoder().decode(&[row_major], 0.3).unwrap(), decoded);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let boxes = [SyntheticBox::person(320.0, 240.0, 100.0, 300.0, 0.9)];
        let mut out = detector_output(&boxes, 20, false);
        // Row 1 has a NaN class logit, row 2 a confident class with a NaN box
        // and row 3 an infinite class logit
        out.tensors[0][[0, 1, 83]] = f32::NAN;
        out.tensors[0][[0, 2, 4]] = logit(0.95);
        out.tensors[0][[0, 2, 0]] = f32::NAN;
        out.tensors[0][[0, 3, 10]] = f32::INFINITY;

        let decoded = decoder().decode(&out.tensors, 0.5).unwrap();

        assert_eq!(decoded.len(), 1, "only the real person survives: {:?}", decoded);
        assert_eq!(decoded[0].class_id, 0);
        assert!((0.0..=1.0).contains(&decoded[0].score));
    }

    #[test]
    fn test_multiple_tensors_are_concatenated() {
        let a = detector_output(&[SyntheticBox::person(50.0, 50.0, 20.0, 20.0, 0.9)], 100, true);
        let b = detector_output(&[SyntheticBox::person(300.0, 300.0, 40.0, 40.0, 0.6)], 20, false);
        let tensors = vec![a.tensors[0].clone(), b.tensors[0].clone()];

        let decoded = decoder().decode(&tensors, 0.5).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded[1].bbox[0] - 280.0).abs() < 1e-4);
    }

    #[test]
    fn test_too_few_channels_is_malformed() {
        let tensor = ArrayD::<f32>::zeros(IxDyn(&[1, 100, 6]));
        let err = decoder().decode(&[tensor], 0.5).unwrap_err();
        assert!(matches!(err, PoseError::MalformedModelOutput(_)));
    }

    #[test]
    fn test_zero_rows_is_malformed() {
        let tensor = ArrayD::<f32>::zeros(IxDyn(&[1, 0, 84]));
        let err = decoder().decode(&[tensor], 0.5).unwrap_err();
        assert!(matches!(err, PoseError::MalformedModelOutput(_)));

        assert!(matches!(
            decoder().decode(&[], 0.5).unwrap_err(),
            PoseError::MalformedModelOutput(_)
        ));
    }

    #[test]
    fn test_unexpected_rank_is_malformed() {
        let tensor = ArrayD::<f32>::zeros(IxDyn(&[2, 84, 10]));
        assert!(matches!(
            decoder().decode(&[tensor], 0.5).unwrap_err(),
            PoseError::MalformedModelOutput(_)
        ));

        let flat = ArrayD::<f32>::zeros(IxDyn(&[84]));
        assert!(matches!(
            decoder().decode(&[flat], 0.5).unwrap_err(),
            PoseError::MalformedModelOutput(_)
        ));
    }

    #[test]
    fn test_channel_mismatch_is_malformed() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[1, 10, 84]));
        let b = ArrayD::<f32>::zeros(IxDyn(&[1, 10, 85]));
        assert!(matches!(
            decoder().decode(&[a, b], 0.5).unwrap_err(),
            PoseError::MalformedModelOutput(_)
        ));
    }

    #[test]
    fn test_nothing_above_threshold_is_empty() {
        let out = detector_output(&[SyntheticBox::person(10.0, 10.0, 5.0, 5.0, 0.2)], 100, true);
        assert!(decoder().decode(&out.tensors, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_argmax_first_wins() {
        let values = [0.1f32, 0.7, 0.7, 0.2];
        assert_eq!(argmax(values.iter()), Some((1, 0.7)));
        assert_eq!(argmax(std::iter::empty()), None);

        let with_nan = [0.1f32, f32::NAN, 0.3, f32::NEG_INFINITY];
        assert_eq!(argmax(with_nan.iter()), Some((2, 0.3)));
        assert_eq!(argmax([f32::NAN].iter()), None);
    }
}

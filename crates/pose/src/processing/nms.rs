use crate::types::RawDetection;

const IOU_EPSILON: f64 = 1e-7;

/// Intersection over union of two `(x1, y1, x2, y2)` boxes.
///
/// The union carries a small epsilon so zero-area boxes yield 0 instead of NaN.
#[inline]
pub fn iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);

    intersection / (area_a + area_b - intersection + IOU_EPSILON)
}

/// Greedy NMS. Returns indices into `boxes`, highest score first.
///
/// A candidate is kept when its IoU with every already kept box is
/// `<= iou_threshold`. Equal scores keep their input order.
pub fn non_max_suppression(
    boxes: &[[f64; 4]],
    scores: &[f64],
    iou_threshold: f64,
    max_outputs: usize,
) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep: Vec<usize> = Vec::with_capacity(max_outputs.min(order.len()));
    for candidate in order {
        if keep.len() >= max_outputs {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|&kept| iou(&boxes[kept], &boxes[candidate]) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }

    keep
}

/// [`non_max_suppression`] over decoded detections.
pub fn suppress(
    detections: &[RawDetection],
    iou_threshold: f64,
    max_outputs: usize,
) -> Vec<RawDetection> {
    let _s = common::span_debug!("nms", candidates = detections.len());

    let boxes: Vec<[f64; 4]> = detections.iter().map(|d| d.bbox).collect();
    let scores: Vec<f64> = detections.iter().map(|d| d.score).collect();

    non_max_suppression(&boxes, &scores, iou_threshold, max_outputs)
        .into_iter()
        .map(|i| detections[i])
        .collect()
}

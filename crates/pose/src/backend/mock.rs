//! Closure-driven backend plus builders for synthetic detector and landmark
//! outputs. Used by the unit tests, the integration tests and the benches.

use super::{BackendOptions, InferenceBackend, InferenceOutput};
use ndarray::{Array, ArrayD, IxDyn};

type Handler = Box<dyn FnMut(&Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> + Send>;

pub struct MockBackend {
    handler: Handler,
    closed: bool,
}

impl MockBackend {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
            closed: false,
        }
    }

    /// Returns the same output on every call.
    pub fn fixed(output: InferenceOutput) -> Self {
        Self::new(move |_| Ok(output.clone()))
    }

    /// Fails every call with `message`.
    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_| Err(anyhow::anyhow!(message)))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl InferenceBackend for MockBackend {
    fn load_model(path: &str, _options: &BackendOptions) -> anyhow::Result<Self> {
        anyhow::bail!("Mock backend cannot load {}; construct it directly", path)
    }

    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        if self.closed {
            anyhow::bail!("Mock backend is closed");
        }
        (self.handler)(input)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Inverse of the sigmoid, for writing logits that decode to a given probability.
pub fn logit(p: f64) -> f32 {
    (p / (1.0 - p)).ln() as f32
}

/// One candidate row of a synthetic YOLO output.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: usize,
    pub score: f64,
}

impl SyntheticBox {
    pub fn person(cx: f32, cy: f32, w: f32, h: f32, score: f64) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            class_id: 0,
            score,
        }
    }
}

/// YOLOv8-style output with 80 classes: `[1, 84, anchors]` when `transposed`
/// (the usual export), `[1, anchors, 84]` otherwise. Unused anchors get a
/// near-zero score.
pub fn detector_output(boxes: &[SyntheticBox], anchors: usize, transposed: bool) -> InferenceOutput {
    const CHANNELS: usize = 84;
    let anchors = anchors.max(boxes.len());

    let mut rows = vec![0.0f32; anchors * CHANNELS];
    for row in rows.chunks_exact_mut(CHANNELS) {
        row[4..].fill(-12.0);
    }
    for (i, b) in boxes.iter().enumerate() {
        let row = &mut rows[i * CHANNELS..(i + 1) * CHANNELS];
        row[0] = b.cx;
        row[1] = b.cy;
        row[2] = b.w;
        row[3] = b.h;
        row[4 + b.class_id] = logit(b.score);
    }

    let tensor = if transposed {
        Array::from_shape_fn(IxDyn(&[1, CHANNELS, anchors]), |idx| {
            rows[idx[2] * CHANNELS + idx[1]]
        })
    } else {
        Array::from_shape_fn(IxDyn(&[1, anchors, CHANNELS]), |idx| {
            rows[idx[1] * CHANNELS + idx[2]]
        })
    };

    InferenceOutput::new(vec![tensor])
}

/// One keypoint of a synthetic landmark output, in landmark-input pixels.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f64,
    pub presence: f64,
}

/// BlazePose-style output: 39x5 landmark values, the pose score logit, then a
/// segmentation mask and a heatmap that the decoder ignores.
pub fn landmark_output(points: &[SyntheticPoint], score: f64) -> InferenceOutput {
    let mut flat = vec![0.0f32; 39 * 5];
    for (i, p) in points.iter().take(39).enumerate() {
        flat[i * 5] = p.x;
        flat[i * 5 + 1] = p.y;
        flat[i * 5 + 2] = p.z;
        flat[i * 5 + 3] = logit(p.visibility);
        flat[i * 5 + 4] = logit(p.presence);
    }

    InferenceOutput::new(vec![
        ArrayD::from_shape_fn(IxDyn(&[1, 195]), |idx| flat[idx[1]]),
        ArrayD::from_elem(IxDyn(&[1, 1]), logit(score)),
        ArrayD::zeros(IxDyn(&[1, 16, 16, 1])),
        ArrayD::zeros(IxDyn(&[1, 8, 8, 39])),
    ])
}

/// 33 points on a diagonal of a `input_size` square, all fully visible.
pub fn diagonal_points(input_size: u32) -> Vec<SyntheticPoint> {
    let step = input_size as f32 / 34.0;
    (0..33)
        .map(|i| {
            let v = step * (i + 1) as f32;
            SyntheticPoint {
                x: v,
                y: v,
                z: -0.1 * i as f32,
                visibility: 0.99,
                presence: 0.99,
            }
        })
        .collect()
}

pub mod decode;
pub mod landmarks;
pub mod nms;

/// Sigmoid activation function
#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

use crate::error::{PoseError, Result};
use preprocess::Frame;
use std::path::Path;

/// Decode an encoded image (JPEG, PNG) into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PoseError::ImageDecode(e.to_string()))?
        .to_rgb8();

    let (width, height) = image.dimensions();
    Frame::from_rgb(width, height, image.into_raw())
        .map_err(|e| PoseError::InvalidImage(format!("{:#}", e)))
}

pub fn load_image(path: &Path) -> Result<Frame> {
    let bytes = std::fs::read(path)
        .map_err(|e| PoseError::ImageDecode(format!("{}: {}", path.display(), e)))?;
    decode_image(&bytes)
}

use crate::config::{CROP_FILL_COLOR, DEFAULT_LANDMARK_INPUT_SIZE};
use crate::geometry::{CropPlan, CropTransform, letterbox_plan};
use crate::image::Frame;
use crate::resize::{RgbResizer, copy_region, paste};
use crate::tensor::{TensorLayout, write_tensor};
use common::span_debug;
use ndarray::{Array, IxDyn};

/// Turns a [`CropPlan`] into a landmark model input.
///
/// One instance belongs to one landmark pool slot; its buffers are never
/// shared with another slot.
pub struct CropPreProcessor {
    pub input_size: u32,
    layout: TensorLayout,
    resizer: RgbResizer,
    region_buffer: Vec<u8>,
    canvas: Vec<u8>,
    input: Array<f32, IxDyn>,
}

impl CropPreProcessor {
    pub fn new(input_size: u32, layout: TensorLayout) -> Self {
        Self {
            input_size,
            layout,
            resizer: RgbResizer::new(),
            region_buffer: Vec::new(),
            canvas: vec![CROP_FILL_COLOR; (input_size * input_size * 3) as usize],
            input: layout.allocate(input_size, input_size),
        }
    }

    /// Extract the planned region and pack it into the input tensor.
    ///
    /// Square plans are stretched to the full input; letterbox plans are
    /// resized with their recorded ratio and padded.
    pub fn preprocess(
        &mut self,
        frame: &Frame,
        plan: &CropPlan,
    ) -> anyhow::Result<&Array<f32, IxDyn>> {
        let _s = span_debug!("crop_preprocess");

        let region = plan.region;
        if region.width == 0 || region.height == 0 {
            anyhow::bail!("Crop region is empty ({}x{})", region.width, region.height);
        }

        copy_region(frame, &region, CROP_FILL_COLOR, &mut self.region_buffer);

        let size = self.input_size;
        match plan.transform {
            CropTransform::Resize { .. } => {
                let resized = self.resizer.resize(
                    &self.region_buffer,
                    region.width,
                    region.height,
                    size,
                    size,
                )?;
                self.canvas.copy_from_slice(resized);
            }
            CropTransform::Letterbox {
                pad_left, pad_top, ..
            } => {
                let lb = letterbox_plan(region.width, region.height, size, size);
                if lb.pad_left != pad_left || lb.pad_top != pad_top {
                    anyhow::bail!(
                        "Crop plan was built for a different input size than {}",
                        size
                    );
                }

                let resized = self.resizer.resize(
                    &self.region_buffer,
                    region.width,
                    region.height,
                    lb.scaled_width,
                    lb.scaled_height,
                )?;
                self.canvas.fill(CROP_FILL_COLOR);
                paste(
                    &mut self.canvas,
                    size,
                    resized,
                    lb.scaled_width,
                    lb.scaled_height,
                    lb.pad_left,
                    lb.pad_top,
                );
            }
        }

        write_tensor(&self.canvas, size, size, self.layout, &mut self.input)?;
        Ok(&self.input)
    }

    /// The RGB canvas fed to the last [`Self::preprocess`] call.
    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }
}

impl Default for CropPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_LANDMARK_INPUT_SIZE, TensorLayout::Nhwc)
    }
}

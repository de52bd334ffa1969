use crate::config::{DEFAULT_INPUT_SIZE, LETTERBOX_COLOR};
use crate::geometry::{LetterboxTransform, letterbox_plan};
use crate::image::Frame;
use crate::resize::{RgbResizer, paste};
use crate::tensor::{TensorLayout, write_tensor};
use common::span;
use ndarray::{Array, IxDyn};

/// Letterboxes frames into the person detector input.
///
/// Owns the padded canvas and the input tensor; both are allocated once and
/// rewritten on every call.
pub struct LetterboxPreProcessor {
    pub input_size: (u32, u32),
    layout: TensorLayout,
    resizer: RgbResizer,
    letterboxed_buffer: Vec<u8>,
    input: Array<f32, IxDyn>,
}

impl LetterboxPreProcessor {
    pub fn new(input_size: (u32, u32), layout: TensorLayout) -> Self {
        Self {
            input_size,
            layout,
            resizer: RgbResizer::new(),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
            input: layout.allocate(input_size.0, input_size.1),
        }
    }

    /// Resize, pad with mid-gray and pack into the input tensor.
    pub fn preprocess(
        &mut self,
        frame: &Frame,
    ) -> anyhow::Result<(&Array<f32, IxDyn>, LetterboxTransform)> {
        let _s = span!("letterbox");

        let (width, height) = (frame.width(), frame.height());
        tracing::trace!(width, height, "Letterboxing frame");

        let plan = letterbox_plan(width, height, self.input_size.0, self.input_size.1);
        let resized = self.resizer.resize(
            frame.pixels(),
            width,
            height,
            plan.scaled_width,
            plan.scaled_height,
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);
        paste(
            &mut self.letterboxed_buffer,
            self.input_size.0,
            resized,
            plan.scaled_width,
            plan.scaled_height,
            plan.pad_left,
            plan.pad_top,
        );

        write_tensor(
            &self.letterboxed_buffer,
            self.input_size.0,
            self.input_size.1,
            self.layout,
            &mut self.input,
        )?;

        Ok((&self.input, plan))
    }

    /// The padded RGB canvas produced by the last [`Self::preprocess`] call.
    pub fn letterboxed(&self) -> &[u8] {
        &self.letterboxed_buffer
    }
}

impl Default for LetterboxPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, TensorLayout::Nchw)
    }
}

use crate::geometry::CropRegion;
use crate::image::Frame;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};

/// Bilinear resizer that keeps its destination image between calls.
pub struct RgbResizer {
    resizer: Resizer,
    options: ResizeOptions,
    dst: Option<Image<'static>>,
}

impl RgbResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            options: ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            dst: None,
        }
    }

    /// Resize packed RGB `src` to `dst_w` x `dst_h` and return the resized bytes.
    pub fn resize(
        &mut self,
        src: &[u8],
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
    ) -> anyhow::Result<&[u8]> {
        let reuse = matches!(&self.dst, Some(img) if img.width() == dst_w && img.height() == dst_h);
        if !reuse {
            self.dst = Some(Image::new(dst_w, dst_h, PixelType::U8x3));
        }
        let dst = self
            .dst
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Resize destination not allocated"))?;

        let src = ImageRef::new(src_w, src_h, src, PixelType::U8x3)?;
        self.resizer.resize(&src, dst, &self.options)?;

        Ok(dst.buffer())
    }
}

impl Default for RgbResizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `region` out of `frame` into `out`, filling pixels outside the frame.
pub fn copy_region(frame: &Frame, region: &CropRegion, fill: u8, out: &mut Vec<u8>) {
    let rw = region.width as usize;
    let rh = region.height as usize;
    out.clear();
    out.resize(rw * rh * 3, fill);

    let fw = frame.width() as i64;
    let fh = frame.height() as i64;
    let x0 = region.x.max(0);
    let x1 = (region.x + region.width as i64).min(fw);
    let y0 = region.y.max(0);
    let y1 = (region.y + region.height as i64).min(fh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let pixels = frame.pixels();
    let row_bytes = ((x1 - x0) * 3) as usize;
    for y in y0..y1 {
        let src = ((y * fw + x0) * 3) as usize;
        let dst = (((y - region.y) * rw as i64 + (x0 - region.x)) * 3) as usize;
        out[dst..dst + row_bytes].copy_from_slice(&pixels[src..src + row_bytes]);
    }
}

/// Paste a packed RGB block into a larger canvas at (`offset_x`, `offset_y`).
pub fn paste(
    canvas: &mut [u8],
    canvas_w: u32,
    block: &[u8],
    block_w: u32,
    block_h: u32,
    offset_x: u32,
    offset_y: u32,
) {
    let stride = (canvas_w * 3) as usize;
    let row_bytes = (block_w * 3) as usize;

    for y in 0..block_h as usize {
        let src_row = y * row_bytes;
        let dst_row = (y + offset_y as usize) * stride + offset_x as usize * 3;
        canvas[dst_row..dst_row + row_bytes].copy_from_slice(&block[src_row..src_row + row_bytes]);
    }
}

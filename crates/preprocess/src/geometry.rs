//! Coordinate transforms between original-image space and model-input space.
//!
//! Everything here is pure arithmetic on `f64`. The detector stage uses a
//! [`LetterboxTransform`]; each landmark crop carries its own [`CropTransform`],
//! and the variant decides which inverse formula is applied.

use serde::Serialize;

/// Axis-aligned box in pixel coordinates (`right > left`, `bottom > top` once finalized).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xyxy(xyxy: [f64; 4]) -> Self {
        Self::new(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
    }

    pub fn to_xyxy(&self) -> [f64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// True when the box has strictly positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Top-left (x, y) plus width and height to corner format.
#[inline]
pub fn xywh_to_xyxy(x: f64, y: f64, w: f64, h: f64) -> [f64; 4] {
    [x, y, x + w, y + h]
}

/// Center-width-height to corner format.
#[inline]
pub fn cxcywh_to_xyxy(cx: f64, cy: f64, w: f64, h: f64) -> [f64; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Clamp every edge into `[0, width] x [0, height]`.
pub fn clamp_to_image(bbox: &BoundingBox, width: u32, height: u32) -> BoundingBox {
    let w = width as f64;
    let h = height as f64;
    BoundingBox {
        left: bbox.left.clamp(0.0, w),
        top: bbox.top.clamp(0.0, h),
        right: bbox.right.clamp(0.0, w),
        bottom: bbox.bottom.clamp(0.0, h),
    }
}

/// Aspect-preserving resize plus centred padding.
///
/// `pad_left`/`pad_top` use truncating division; the remainder goes to the
/// right/bottom, see [`LetterboxTransform::pad_right`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub ratio: f64,
    pub pad_left: u32,
    pub pad_top: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

/// Plan the letterbox that fits `src` into `dst`.
///
/// Callers must reject zero-sized sources; `ratio` would otherwise be infinite.
pub fn letterbox_plan(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> LetterboxTransform {
    let ratio = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let scaled_width = ((src_w as f64 * ratio).round() as u32).clamp(1, dst_w.max(1));
    let scaled_height = ((src_h as f64 * ratio).round() as u32).clamp(1, dst_h.max(1));

    LetterboxTransform {
        ratio,
        pad_left: (dst_w - scaled_width) / 2,
        pad_top: (dst_h - scaled_height) / 2,
        scaled_width,
        scaled_height,
    }
}

/// Map a point from letterboxed model-input space back to the source image.
#[inline]
pub fn unletterbox(point: (f64, f64), ratio: f64, pad_left: u32, pad_top: u32) -> (f64, f64) {
    (
        (point.0 - pad_left as f64) / ratio,
        (point.1 - pad_top as f64) / ratio,
    )
}

impl LetterboxTransform {
    pub fn pad_right(&self, dst_w: u32) -> u32 {
        dst_w - self.scaled_width - self.pad_left
    }

    pub fn pad_bottom(&self, dst_h: u32) -> u32 {
        dst_h - self.scaled_height - self.pad_top
    }

    /// Source image point to letterboxed point.
    pub fn forward(&self, point: (f64, f64)) -> (f64, f64) {
        (
            point.0 * self.ratio + self.pad_left as f64,
            point.1 * self.ratio + self.pad_top as f64,
        )
    }

    /// Letterboxed point to source image point.
    pub fn inverse(&self, point: (f64, f64)) -> (f64, f64) {
        unletterbox(point, self.ratio, self.pad_left, self.pad_top)
    }

    pub fn forward_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let (left, top) = self.forward((bbox.left, bbox.top));
        let (right, bottom) = self.forward((bbox.right, bbox.bottom));
        BoundingBox::new(left, top, right, bottom)
    }

    pub fn inverse_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let (left, top) = self.inverse((bbox.left, bbox.top));
        let (right, bottom) = self.inverse((bbox.right, bbox.bottom));
        BoundingBox::new(left, top, right, bottom)
    }
}

/// How a person box is turned into a landmark model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
    /// Square region around the box centre, stretched to the input size.
    #[default]
    Square,
    /// Margin-expanded box clipped to the image, letterboxed into the input.
    Letterbox,
}

/// Integer pixel region of the source image. May extend past the image edges
/// in [`CropMode::Square`]; those pixels are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Inverse mapping from a landmark model input back to the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropTransform {
    Letterbox {
        ratio: f64,
        pad_left: u32,
        pad_top: u32,
        crop_origin_x: f64,
        crop_origin_y: f64,
    },
    Resize {
        crop_origin_x: f64,
        crop_origin_y: f64,
        crop_width: f64,
        crop_height: f64,
    },
}

impl CropTransform {
    /// Map a normalized `[0, 1]` point of a `input_size`-square model input to
    /// source image pixels.
    pub fn to_image(&self, x_norm: f64, y_norm: f64, input_size: u32) -> (f64, f64) {
        match *self {
            CropTransform::Letterbox {
                ratio,
                pad_left,
                pad_top,
                crop_origin_x,
                crop_origin_y,
            } => {
                let size = input_size as f64;
                let (x, y) = unletterbox((x_norm * size, y_norm * size), ratio, pad_left, pad_top);
                (crop_origin_x + x, crop_origin_y + y)
            }
            CropTransform::Resize {
                crop_origin_x,
                crop_origin_y,
                crop_width,
                crop_height,
            } => (
                crop_origin_x + x_norm * crop_width,
                crop_origin_y + y_norm * crop_height,
            ),
        }
    }
}

/// Region to extract plus the transform that undoes the extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPlan {
    pub region: CropRegion,
    pub transform: CropTransform,
}

impl CropPlan {
    pub fn for_box(
        mode: CropMode,
        bbox: &BoundingBox,
        margin: f64,
        image_width: u32,
        image_height: u32,
        input_size: u32,
    ) -> Self {
        match mode {
            CropMode::Square => Self::square(bbox, margin),
            CropMode::Letterbox => {
                Self::letterbox(bbox, margin, image_width, image_height, input_size)
            }
        }
    }

    /// Square of side `max(w, h) * margin` centred on the box.
    pub fn square(bbox: &BoundingBox, margin: f64) -> Self {
        let (cx, cy) = bbox.center();
        let side = (bbox.width().max(bbox.height()) * margin).round().max(1.0) as u32;
        let half = side as f64 / 2.0;
        let x = (cx - half).round() as i64;
        let y = (cy - half).round() as i64;

        Self {
            region: CropRegion {
                x,
                y,
                width: side,
                height: side,
            },
            transform: CropTransform::Resize {
                crop_origin_x: x as f64,
                crop_origin_y: y as f64,
                crop_width: side as f64,
                crop_height: side as f64,
            },
        }
    }

    /// Margin-expanded box, clipped to the image, letterboxed into the input.
    pub fn letterbox(
        bbox: &BoundingBox,
        margin: f64,
        image_width: u32,
        image_height: u32,
        input_size: u32,
    ) -> Self {
        let (cx, cy) = bbox.center();
        let half_w = bbox.width() * margin / 2.0;
        let half_h = bbox.height() * margin / 2.0;
        let (x0, x1) = clip_span(cx - half_w, cx + half_w, image_width);
        let (y0, y1) = clip_span(cy - half_h, cy + half_h, image_height);

        let width = x1 - x0;
        let height = y1 - y0;
        let plan = letterbox_plan(width, height, input_size, input_size);

        Self {
            region: CropRegion {
                x: x0 as i64,
                y: y0 as i64,
                width,
                height,
            },
            transform: CropTransform::Letterbox {
                ratio: plan.ratio,
                pad_left: plan.pad_left,
                pad_top: plan.pad_top,
                crop_origin_x: x0 as f64,
                crop_origin_y: y0 as f64,
            },
        }
    }
}

/// Clip `[start, end)` to `[0, limit)` on whole pixels, keeping at least one pixel.
fn clip_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let lo = (start.max(0.0).floor() as u32).min(limit - 1);
    let hi = (end.min(limit as f64).ceil() as u32).clamp(lo + 1, limit);
    (lo, hi)
}

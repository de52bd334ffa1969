pub mod config;
pub mod crop;
pub mod geometry;
pub mod image;
pub mod letterbox;
pub mod resize;
pub mod tensor;

pub use config::{
    DEFAULT_CROP_MARGIN, DEFAULT_INPUT_SIZE, DEFAULT_LANDMARK_INPUT_SIZE, LETTERBOX_COLOR,
};
pub use crop::CropPreProcessor;
pub use geometry::{
    BoundingBox, CropMode, CropPlan, CropRegion, CropTransform, LetterboxTransform,
    clamp_to_image, cxcywh_to_xyxy, letterbox_plan, unletterbox, xywh_to_xyxy,
};
pub use image::{ChannelOrder, Frame, ImageView};
pub use letterbox::LetterboxPreProcessor;
pub use tensor::TensorLayout;

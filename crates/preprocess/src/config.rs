/// Person detector input (width, height).
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Edge length of the square landmark model input.
pub const DEFAULT_LANDMARK_INPUT_SIZE: u32 = 256;

/// Fill value for the letterbox border of the detector input.
pub const LETTERBOX_COLOR: u8 = 114;

/// Fill value for landmark crop pixels that fall outside the source image.
pub const CROP_FILL_COLOR: u8 = 0;

/// Context margin applied around a person box before cropping.
pub const DEFAULT_CROP_MARGIN: f64 = 1.25;

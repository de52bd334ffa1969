use serde::Serialize;

/// Byte order of the three channels in a packed pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Borrowed, packed 3-channel image as handed over by the image source.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl<'a> ImageView<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32, order: ChannelOrder) -> Self {
        Self {
            pixels,
            width,
            height,
            order,
        }
    }

    pub fn rgb(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(pixels, width, height, ChannelOrder::Rgb)
    }

    pub fn bgr(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(pixels, width, height, ChannelOrder::Bgr)
    }

    /// Copy into an owned RGB frame, swapping channels if the view is BGR.
    pub fn to_frame(&self) -> anyhow::Result<Frame> {
        validate_dimensions(self.pixels.len(), self.width, self.height)?;

        let pixels = match self.order {
            ChannelOrder::Rgb => self.pixels.to_vec(),
            ChannelOrder::Bgr => {
                let mut rgb = Vec::with_capacity(self.pixels.len());
                for px in self.pixels.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                rgb
            }
        };

        Ok(Frame {
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}

/// Owned RGB frame shared by both pipeline stages.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> anyhow::Result<Self> {
        validate_dimensions(pixels.len(), width, height)?;
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> anyhow::Result<Self> {
        let mut pixels = Vec::with_capacity((width as usize) * (height as usize) * 3);
        for _ in 0..(width as usize) * (height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self::from_rgb(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView::rgb(&self.pixels, self.width, self.height)
    }
}

fn validate_dimensions(len: usize, width: u32, height: u32) -> anyhow::Result<()> {
    if width == 0 || height == 0 {
        anyhow::bail!("Image has zero width or height ({}x{})", width, height);
    }

    let expected_size = (width as usize) * (height as usize) * 3;
    if len != expected_size {
        anyhow::bail!(
            "Buffer size mismatch: expected {} bytes for {}x{} RGB, got {} bytes",
            expected_size,
            width,
            height,
            len
        );
    }

    Ok(())
}

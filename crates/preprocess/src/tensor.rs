use ndarray::{Array, IxDyn};

/// Memory layout expected by a model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, the usual ONNX export of YOLO detectors.
    #[default]
    Nchw,
    /// `[1, H, W, 3]`, the usual BlazePose landmark export.
    Nhwc,
}

impl TensorLayout {
    pub fn shape(&self, width: u32, height: u32) -> [usize; 4] {
        let (w, h) = (width as usize, height as usize);
        match self {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        }
    }

    /// Zeroed input tensor of the right shape, allocated once per owner.
    pub fn allocate(&self, width: u32, height: u32) -> Array<f32, IxDyn> {
        Array::zeros(IxDyn(&self.shape(width, height)))
    }
}

/// Pack RGB bytes into `out`, scaling to `[0, 1]`.
pub fn write_tensor(
    rgb: &[u8],
    width: u32,
    height: u32,
    layout: TensorLayout,
    out: &mut Array<f32, IxDyn>,
) -> anyhow::Result<()> {
    let expected = layout.shape(width, height);
    if out.shape() != expected {
        anyhow::bail!(
            "Tensor shape mismatch: expected {:?}, got {:?}",
            expected,
            out.shape()
        );
    }

    let spatial = (width as usize) * (height as usize);
    if rgb.len() != spatial * 3 {
        anyhow::bail!(
            "Buffer size mismatch: expected {}, got {} bytes",
            spatial * 3,
            rgb.len()
        );
    }

    let data = out
        .as_slice_mut()
        .ok_or_else(|| anyhow::anyhow!("Input tensor is not contiguous"))?;

    match layout {
        TensorLayout::Nchw => {
            for (i, px) in rgb.chunks_exact(3).enumerate() {
                data[i] = px[0] as f32 / 255.0;
                data[i + spatial] = px[1] as f32 / 255.0;
                data[i + 2 * spatial] = px[2] as f32 / 255.0;
            }
        }
        TensorLayout::Nhwc => {
            for (dst, &src) in data.iter_mut().zip(rgb.iter()) {
                *dst = src as f32 / 255.0;
            }
        }
    }

    Ok(())
}

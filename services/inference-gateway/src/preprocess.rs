//! Raw upload bytes -> fixed-shape NHWC tensor.

use crate::error::InvalidImage;
use image::imageops::FilterType;
use tract_onnx::prelude::tract_ndarray::Array4;

pub const IMG_HEIGHT: usize = 224;
pub const IMG_WIDTH: usize = 224;
pub const CHANNELS: usize = 3;
pub const INPUT_SHAPE: [usize; 4] = [1, IMG_HEIGHT, IMG_WIDTH, CHANNELS];

/// Resampling used for every resize. Bicubic, matching the filter the model
/// was trained against.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// `(1, 224, 224, 3)` of `f32` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    /// All-zero tensor of the model input shape.
    pub fn zeros() -> Self { Self(Array4::zeros((1, IMG_HEIGHT, IMG_WIDTH, CHANNELS))) }

    pub fn shape(&self) -> &[usize] { self.0.shape() }
    pub fn as_array(&self) -> &Array4<f32> { &self.0 }
    pub fn into_array(self) -> Array4<f32> { self.0 }
}

pub fn preprocess(raw: &[u8]) -> Result<ImageTensor, InvalidImage> {
    if raw.is_empty() {
        return Err(InvalidImage { reason: "empty payload".into() });
    }
    let decoded = image::load_from_memory(raw).map_err(|e| InvalidImage { reason: e.to_string() })?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, IMG_WIDTH as u32, IMG_HEIGHT as u32, RESIZE_FILTER);
    let arr = Array4::from_shape_fn((1, IMG_HEIGHT, IMG_WIDTH, CHANNELS), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });
    Ok(ImageTensor(arr))
}

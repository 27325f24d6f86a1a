//! Image transforms applied by the lazy dataset on every `get`
//!
//! The standard pipeline is resize, conversion to a CHW `f32` tensor in
//! `[0, 1]`, then per-channel normalization.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decoded image as a flattened CHW buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Pixel values, channel-major: `data[c * height * width + y * width + x]`
    pub data: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageTensor {
    /// `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// Converts a decoded RGB image into the tensor handed to the model.
///
/// Implementations are called concurrently from loader workers.
pub trait Transform: Send + Sync {
    fn apply(&self, image: RgbImage) -> ImageTensor;
}

/// Raw pixel conversion: CHW `f32`, values scaled to `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToTensor;

impl Transform for ToTensor {
    fn apply(&self, image: RgbImage) -> ImageTensor {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);
        let plane = width * height;

        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for channel in 0..3 {
                data[channel * plane + offset] = pixel[channel] as f32 / 255.0;
            }
        }

        ImageTensor {
            data,
            channels: 3,
            height,
            width,
        }
    }
}

/// Resize step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    /// Resize to exactly `width x height`
    Exact { width: u32, height: u32 },
    /// Scale so the shorter side equals the value, keeping the aspect ratio
    ShorterSide(u32),
}

impl Resize {
    /// Square output of `size x size`
    pub fn square(size: u32) -> Self {
        Resize::Exact {
            width: size,
            height: size,
        }
    }

    /// Output dimensions for an input of `width x height`
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            Resize::Exact { width, height } => (width, height),
            Resize::ShorterSide(size) => {
                if width == 0 || height == 0 {
                    (width, height)
                } else if width <= height {
                    let long = (size as u64 * height as u64 / width as u64) as u32;
                    (size, long)
                } else {
                    let long = (size as u64 * width as u64 / height as u64) as u32;
                    (long, size)
                }
            }
        }
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = self.target_size(width, height);
        if (target_width, target_height) == (width, height) {
            return image;
        }
        imageops::resize(&image, target_width, target_height, FilterType::Triangle)
    }
}

/// Per-channel `(x - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn apply(&self, tensor: &mut ImageTensor) {
        let plane = tensor.height * tensor.width;
        if plane == 0 {
            return;
        }
        for (channel, values) in tensor.data.chunks_mut(plane).enumerate().take(3) {
            let (mean, std) = (self.mean[channel], self.std[channel]);
            for value in values {
                *value = (*value - mean) / std;
            }
        }
    }
}

/// Resize -> ToTensor -> Normalize, each step optional except the conversion
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageTransform {
    pub resize: Option<Resize>,
    pub normalize: Option<Normalize>,
}

impl ImageTransform {
    /// Conversion only, equivalent to [`ToTensor`]
    pub fn new() -> Self {
        Self::default()
    }

    /// `size x size` images normalized with the ImageNet statistics
    pub fn imagenet(size: u32) -> Self {
        Self::new()
            .with_resize(Resize::square(size))
            .with_normalize(Normalize::imagenet())
    }

    pub fn with_resize(mut self, resize: Resize) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn with_normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = Some(normalize);
        self
    }
}

impl Transform for ImageTransform {
    fn apply(&self, image: RgbImage) -> ImageTensor {
        let image = match &self.resize {
            Some(resize) => resize.apply(image),
            None => image,
        };

        let mut tensor = ToTensor.apply(image);
        if let Some(normalize) = &self.normalize {
            normalize.apply(&mut tensor);
        }
        tensor
    }
}

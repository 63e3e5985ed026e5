//! Image Transforms
//!
//! Turns a decoded photo into a flat CHW `Vec<f32>` in `[0, 1]`. Mean/std
//! normalisation happens later in the batcher.
//!
//! - **BaseAugmentation**: resize only
//! - **CustomAugmentation**: center crop on the face, resize, brightness and
//!   contrast jitter, gaussian noise
//! - **ValAugmentation**: resize only, never random

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::utils::error::MaskClassifierError;

/// Face-centred crop used by `CustomAugmentation` (height, width)
const CENTER_CROP: (u32, u32) = (320, 256);
const JITTER: f32 = 0.1;
const NOISE_STD: f32 = 0.02;

/// Registered transform pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentationKind {
    BaseAugmentation,
    CustomAugmentation,
    ValAugmentation,
}

impl FromStr for AugmentationKind {
    type Err = MaskClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BaseAugmentation" => Ok(Self::BaseAugmentation),
            "CustomAugmentation" => Ok(Self::CustomAugmentation),
            "ValAugmentation" => Ok(Self::ValAugmentation),
            other => Err(MaskClassifierError::Config(format!(
                "unknown augmentation '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AugmentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A transform pipeline bound to an output size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub kind: AugmentationKind,
    /// Output (height, width)
    pub resize: (u32, u32),
}

impl Transform {
    pub fn new(kind: AugmentationKind, resize: (u32, u32)) -> Self {
        Self { kind, resize }
    }

    /// Whether this pipeline draws from the random source
    pub fn is_random(&self) -> bool {
        matches!(self.kind, AugmentationKind::CustomAugmentation)
    }

    /// Apply the pipeline, returning CHW floats in `[0, 1]`
    pub fn apply<R: Rng>(&self, img: DynamicImage, rng: &mut R) -> Vec<f32> {
        let (height, width) = self.resize;

        let img = match self.kind {
            AugmentationKind::CustomAugmentation => center_crop(img, CENTER_CROP),
            _ => img,
        };

        let mut img = img.resize_exact(width, height, FilterType::Triangle);

        if self.kind == AugmentationKind::CustomAugmentation {
            let brightness = rng.gen_range(-JITTER..=JITTER);
            let contrast = 1.0 + rng.gen_range(-JITTER..=JITTER);
            img = jitter(&img, brightness, contrast);
        }

        let mut data = to_chw(&img);

        if self.kind == AugmentationKind::CustomAugmentation {
            if let Ok(noise) = Normal::new(0.0f32, NOISE_STD) {
                for v in data.iter_mut() {
                    *v = (*v + noise.sample(rng)).clamp(0.0, 1.0);
                }
            }
        }

        data
    }
}

fn center_crop(img: DynamicImage, (crop_h, crop_w): (u32, u32)) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= crop_w || height <= crop_h {
        return img;
    }
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    img.crop_imm(x, y, crop_w, crop_h)
}

/// Shift brightness by `delta` and scale contrast around the mean luminance
fn jitter(img: &DynamicImage, delta: f32, factor: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let count = (width * height).max(1) as f32;
    let mean = rgb
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .sum::<f32>()
        / count;

    let shift = delta * 255.0;
    let mut output = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let adjust = |v: u8| (mean + factor * (v as f32 - mean) + shift).clamp(0.0, 255.0) as u8;
        output.put_pixel(x, y, Rgb([adjust(pixel[0]), adjust(pixel[1]), adjust(pixel[2])]));
    }

    DynamicImage::ImageRgb8(output)
}

/// RGB image → CHW floats in `[0, 1]`
pub fn to_chw(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

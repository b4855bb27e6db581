// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the ViT classifier

use candle_core::{Device, Tensor};
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;

use crate::config::ClassifierConfig;

/// Stretch-resize plus per-channel normalization
///
/// Steps:
/// 1. Convert to RGB (alpha is dropped, not composited)
/// 2. Resize to `size x size` with bilinear filtering, aspect ratio NOT preserved
/// 3. Scale to [0, 1]: pixel / 255
/// 4. Normalize: (value - mean[c]) / std[c]
/// 5. Convert to NCHW tensor format [1, 3, size, size]
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    pub size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Preprocessor {
    pub fn new(size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { size, mean, std }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            config.img_size as u32,
            config.normalization_mean,
            config.normalization_std,
        )
    }

    pub fn to_array(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8())
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();

        let size = self.size as usize;
        let mut tensor = Array4::zeros((1, 3, size, size));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                let normalized = (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
                tensor[[0, c, y as usize, x as usize]] = normalized;
            }
        }

        tensor
    }

    pub fn to_tensor(&self, image: &DynamicImage, device: &Device) -> candle_core::Result<Tensor> {
        let array = self.to_array(image);
        let shape = array.dim();
        let (data, _) = array.into_raw_vec_and_offset();
        Tensor::from_vec(data, shape, device)
    }
}

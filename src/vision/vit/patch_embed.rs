// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Patch embedding: a strided convolution whose kernel equals its stride

use candle_core::{Module, Result, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};

use super::VitConfig;

#[derive(Debug, Clone)]
pub struct PatchEmbedding {
    proj: Conv2d,
}

impl PatchEmbedding {
    pub fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let conv_config = Conv2dConfig {
            stride: config.patch_size,
            ..Default::default()
        };
        let proj = conv2d(
            config.in_channels,
            config.embed_dim,
            config.patch_size,
            conv_config,
            vb.pp("proj"),
        )?;
        Ok(Self { proj })
    }
}

impl Module for PatchEmbedding {
    /// (B, C, H, W) -> (B, num_patches, embed_dim)
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.proj.forward(xs)?.flatten_from(2)?.transpose(1, 2)
    }
}

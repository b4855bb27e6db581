// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision Transformer classifier and weight loading

use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, VarBuilder};
use std::path::Path;
use tracing::{debug, info};

use super::{
    ImageClassifier, ModelError, PatchEmbedding, TransformerBlock, VitConfig, LAYER_NORM_EPS,
};

/// ViT: patch embedding, class token, learned positions, transformer stack,
/// final norm on the class token, linear head.
///
/// Built once, then shared read-only. There is no dropout and no training
/// mode, so every forward pass is deterministic.
#[derive(Debug, Clone)]
pub struct VisionTransformer {
    config: VitConfig,
    patch_embed: PatchEmbedding,
    cls_token: Tensor,
    pos_embed: Tensor,
    blocks: Vec<TransformerBlock>,
    norm: LayerNorm,
    head: Linear,
}

impl VisionTransformer {
    pub fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self, ModelError> {
        config.validate()?;
        let dim = config.embed_dim;

        let patch_embed = PatchEmbedding::new(config, vb.pp("patch_embed"))?;
        let cls_token = vb.get((1, 1, dim), "cls_token")?;
        let pos_embed = vb.get((1, config.seq_len(), dim), "pos_embed")?;

        let blocks_vb = vb.pp("transformer");
        let blocks = (0..config.depth)
            .map(|i| TransformerBlock::new(config, blocks_vb.pp(i.to_string())))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let norm = layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm"))?;
        let head = linear(dim, config.num_classes, vb.pp("head"))?;

        Ok(Self {
            config: *config,
            patch_embed,
            cls_token,
            pos_embed,
            blocks,
            norm,
            head,
        })
    }

    /// Load weights from disk
    ///
    /// `.safetensors` files are read fully into memory; anything else is read as a
    /// PyTorch pickle (`torch.save(model.state_dict(), ...)`). Any missing
    /// parameter or shape disagreement with `config` fails here, never per
    /// request.
    pub fn load(
        config: &VitConfig,
        weights_path: impl AsRef<Path>,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let path = weights_path.as_ref();
        if !path.exists() {
            return Err(ModelError::WeightsNotFound(path.to_path_buf()));
        }

        let is_safetensors = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("safetensors"))
            .unwrap_or(false);

        debug!("Loading ViT weights from {}", path.display());
        let vb = if is_safetensors {
            let buffer = std::fs::read(path).map_err(candle_core::Error::wrap)?;
            VarBuilder::from_buffered_safetensors(buffer, DType::F32, device)?
        } else {
            VarBuilder::from_pth(path, DType::F32, device)?
        };

        let model = Self::new(config, vb)?;
        info!(
            "✅ ViT loaded from {} (embed_dim={}, depth={}, heads={}, classes={})",
            path.display(),
            config.embed_dim,
            config.depth,
            config.num_heads,
            config.num_classes
        );
        Ok(model)
    }

    pub fn config(&self) -> &VitConfig {
        &self.config
    }

    fn check_input(&self, pixels: &Tensor) -> Result<usize, ModelError> {
        let dims = pixels.dims();
        let size = self.config.img_size;
        match dims {
            [b, c, h, w] if *c == self.config.in_channels && *h == size && *w == size => Ok(*b),
            _ => Err(ModelError::ShapeMismatch {
                channels: self.config.in_channels,
                size,
                actual: dims.to_vec(),
            }),
        }
    }

    /// (B, 3, H, W) -> (B, num_classes)
    pub fn forward(&self, pixels: &Tensor) -> Result<Tensor, ModelError> {
        let batch = self.check_input(pixels)?;

        let patches = self.patch_embed.forward(pixels)?;
        let cls = self
            .cls_token
            .broadcast_as((batch, 1, self.config.embed_dim))?
            .contiguous()?;
        let mut xs = Tensor::cat(&[&cls, &patches], 1)?.broadcast_add(&self.pos_embed)?;

        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }

        let cls_out = self.norm.forward(&xs.i((.., 0))?)?;
        Ok(self.head.forward(&cls_out)?)
    }
}

impl ImageClassifier for VisionTransformer {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn logits(&self, pixels: &Tensor) -> Result<Tensor, ModelError> {
        self.forward(pixels)
    }
}

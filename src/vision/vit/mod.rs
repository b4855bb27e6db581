// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision Transformer classifier
//!
//! Components:
//! - `patch_embed` - Non-overlapping patch projection
//! - `attention` - Multi-head self-attention with packed q/k/v projection
//! - `block` - Pre-norm transformer block
//! - `model` - Full classifier and weight loading
//!
//! Parameter names follow the PyTorch state dict the weights were saved from,
//! so a `.pth` checkpoint loads without conversion.

pub mod attention;
pub mod block;
pub mod model;
pub mod patch_embed;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use attention::MultiHeadSelfAttention;
pub use block::TransformerBlock;
pub use model::VisionTransformer;
pub use patch_embed::PatchEmbedding;

/// LayerNorm epsilon used throughout the model
pub const LAYER_NORM_EPS: f64 = 1e-5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Input shape mismatch: expected (batch, {channels}, {size}, {size}), got {actual:?}")]
    ShapeMismatch {
        channels: usize,
        size: usize,
        actual: Vec<usize>,
    },

    #[error("Weights file not found: {}", .0.display())]
    WeightsNotFound(PathBuf),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Architecture hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitConfig {
    pub img_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    pub depth: usize,
    pub num_heads: usize,
    pub mlp_dim: usize,
    pub num_classes: usize,
}

impl Default for VitConfig {
    fn default() -> Self {
        Self {
            img_size: 224,
            patch_size: 16,
            in_channels: 3,
            embed_dim: 384,
            depth: 4,
            num_heads: 4,
            mlp_dim: 1024,
            num_classes: 3,
        }
    }
}

impl VitConfig {
    /// Patches along one side of the image
    pub fn grid_size(&self) -> usize {
        self.img_size / self.patch_size
    }

    pub fn num_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Patch tokens plus the classification token
    pub fn seq_len(&self) -> usize {
        self.num_patches() + 1
    }

    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.patch_size == 0 || self.img_size % self.patch_size != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "img_size {} must be a multiple of patch_size {}",
                self.img_size, self.patch_size
            )));
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "embed_dim {} must be a multiple of num_heads {}",
                self.embed_dim, self.num_heads
            )));
        }
        if self.depth == 0 || self.num_classes == 0 {
            return Err(ModelError::InvalidConfig(
                "depth and num_classes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inference-only classification interface
///
/// Implementations must not hold request-local mutable state: one instance
/// serves every request concurrently.
pub trait ImageClassifier: Send + Sync {
    /// Length of the logit vector
    fn num_classes(&self) -> usize;

    /// Map a `(batch, 3, H, W)` tensor to `(batch, num_classes)` logits
    fn logits(&self, pixels: &Tensor) -> Result<Tensor, ModelError>;
}

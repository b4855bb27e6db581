// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pre-norm transformer block
//!
//! x = x + attn(norm1(x))
//! x = x + mlp(norm2(x))
//!
//! The MLP checkpoint keys are `mlp.0` and `mlp.3`: positions 1, 2 and 4 of
//! the original sequential held GELU and dropout, which carry no weights.

use candle_core::{Module, Result, Tensor};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, VarBuilder};

use super::{MultiHeadSelfAttention, VitConfig, LAYER_NORM_EPS};

#[derive(Debug, Clone)]
pub struct TransformerBlock {
    norm1: LayerNorm,
    attn: MultiHeadSelfAttention,
    norm2: LayerNorm,
    fc1: Linear,
    fc2: Linear,
}

impl TransformerBlock {
    pub fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.embed_dim;
        let mlp = vb.pp("mlp");

        Ok(Self {
            norm1: layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm1"))?,
            attn: MultiHeadSelfAttention::new(config, vb.pp("attn"))?,
            norm2: layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm2"))?,
            fc1: linear(dim, config.mlp_dim, mlp.pp("0"))?,
            fc2: linear(config.mlp_dim, dim, mlp.pp("3"))?,
        })
    }

    fn mlp(&self, xs: &Tensor) -> Result<Tensor> {
        self.fc2.forward(&self.fc1.forward(xs)?.gelu_erf()?)
    }
}

impl Module for TransformerBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = (xs + self.attn.forward(&self.norm1.forward(xs)?)?)?;
        let mlp_out = self.mlp(&self.norm2.forward(&xs)?)?;
        xs + mlp_out
    }
}

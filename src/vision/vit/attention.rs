// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-head self-attention
//!
//! Query, key and value share one packed projection (`in_proj_weight` of shape
//! `[3 * embed_dim, embed_dim]`, rows ordered q, k, v) followed by `out_proj`.

use candle_core::{IndexOp, Module, Result, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use super::VitConfig;

#[derive(Debug, Clone)]
pub struct MultiHeadSelfAttention {
    in_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl MultiHeadSelfAttention {
    pub fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.embed_dim;
        let weight = vb.get((3 * dim, dim), "in_proj_weight")?;
        let bias = vb.get(3 * dim, "in_proj_bias")?;
        let out_proj = linear(dim, dim, vb.pp("out_proj"))?;
        let head_dim = config.head_dim();

        Ok(Self {
            in_proj: Linear::new(weight, Some(bias)),
            out_proj,
            num_heads: config.num_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }
}

impl Module for MultiHeadSelfAttention {
    /// (B, N, E) -> (B, N, E)
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, n, e) = xs.dims3()?;

        // (B, N, 3E) -> (3, B, H, N, D)
        let qkv = self
            .in_proj
            .forward(xs)?
            .reshape((b, n, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let q = qkv.i(0)?.contiguous()?;
        let k = qkv.i(1)?.contiguous()?;
        let v = qkv.i(2)?.contiguous()?;

        let scores = (q.matmul(&k.t()?.contiguous()?)? * self.scale)?;
        let weights = candle_nn::ops::softmax_last_dim(&scores)?;

        let attended = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, n, e))?;

        self.out_proj.forward(&attended)
    }
}

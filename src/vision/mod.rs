// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fundus image classification
//!
//! This module provides:
//! - Upload decoding and preprocessing
//! - The Vision Transformer model definition
//! - `ClassificationService`, the immutable context shared by all requests

pub mod classifier;
pub mod image_utils;
pub mod preprocessing;
pub mod vit;

pub use classifier::{ClassificationService, ClassifyError, Prediction};
pub use image_utils::{decode_image_bytes, ImageError, ImageInfo};
pub use preprocessing::Preprocessor;
pub use vit::{ImageClassifier, ModelError, VisionTransformer, VitConfig};

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Classification service: decode, preprocess, forward pass, softmax, label
//!
//! A `ClassificationService` is constructed once at startup and shared
//! read-only by every request.

use anyhow::Context;
use candle_core::{Device, Tensor, D};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ClassifierConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::vision::image_utils::{decode_image_bytes, ImageError};
use crate::vision::preprocessing::Preprocessor;
use crate::vision::vit::{ImageClassifier, ModelError, VisionTransformer};

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Caller error: the upload could not be decoded
    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    /// Server error: the forward pass or post-processing failed
    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
}

impl From<candle_core::Error> for ClassifyError {
    fn from(e: candle_core::Error) -> Self {
        ClassifyError::Inference(ModelError::Candle(e))
    }
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    /// Winning probability as a percentage, rounded to two decimals
    pub confidence: f64,
    /// Full softmax distribution, in label order
    pub probabilities: Vec<f32>,
    pub processing_time_ms: u64,
}

/// Round a probability in [0, 1] to a two-decimal percentage
///
/// Rounding is on the exact decimal value of the percentage, with exact
/// halfway cases going to the even digit (3.125 -> 3.12, 9.375 -> 9.38).
pub fn confidence_percent(probability: f32) -> f64 {
    let percent = (probability as f64 * 100.0).clamp(0.0, 100.0);
    // Only values with at most three binary fraction digits can sit exactly
    // halfway; for those `percent * 100` is exact.
    if (percent * 8.0).fract() == 0.0 {
        return (percent * 100.0).round_ties_even() / 100.0;
    }
    format!("{:.2}", percent).parse().unwrap_or(percent)
}

/// Index of the first maximum, `None` for an empty slice
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub struct ClassificationService {
    model: Arc<dyn ImageClassifier>,
    labels: Vec<String>,
    preprocessor: Preprocessor,
    device: Device,
    max_image_bytes: usize,
}

impl std::fmt::Debug for ClassificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationService")
            .field("labels", &self.labels)
            .field("preprocessor", &self.preprocessor)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl ClassificationService {
    pub fn new(
        model: Arc<dyn ImageClassifier>,
        config: &ClassifierConfig,
        device: Device,
    ) -> Result<Self, ModelError> {
        if model.num_classes() != config.class_labels.len() {
            return Err(ModelError::InvalidConfig(format!(
                "model produces {} logits but {} class labels are configured",
                model.num_classes(),
                config.class_labels.len()
            )));
        }

        Ok(Self {
            model,
            labels: config.class_labels.clone(),
            preprocessor: Preprocessor::from_config(config),
            device,
            max_image_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }

    /// Startup path: validate, select the device, load weights
    pub fn from_config(config: &ClassifierConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid classifier configuration")?;

        let device = config
            .device
            .to_device()
            .with_context(|| format!("Failed to initialize {:?} device", config.device))?;
        info!("🧠 Using device: {:?}", device);

        let model = VisionTransformer::load(&config.vit_config(), &config.weights_path, &device)
            .with_context(|| {
                format!(
                    "Failed to load model weights from {}",
                    config.weights_path.display()
                )
            })?;

        Ok(Self::new(Arc::new(model), config, device)?)
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Prediction, ClassifyError> {
        let (image, info) = decode_image_bytes(bytes, self.max_image_bytes)?;
        debug!(
            "Decoded image: {}x{} {:?}, {} bytes",
            info.width, info.height, info.format, info.size_bytes
        );
        self.classify_image(&image)
    }

    pub fn classify_image(&self, image: &DynamicImage) -> Result<Prediction, ClassifyError> {
        let start = Instant::now();

        let pixels = self.preprocessor.to_tensor(image, &self.device)?;
        let logits = self.model.logits(&pixels)?;
        let probabilities = self.softmax_row(&logits)?;

        let class_index = argmax(&probabilities).ok_or_else(|| {
            ModelError::InvalidConfig("model returned an empty logit vector".to_string())
        })?;
        let label = self
            .labels
            .get(class_index)
            .cloned()
            .ok_or_else(|| {
                ModelError::InvalidConfig(format!(
                    "class index {} outside {} labels",
                    class_index,
                    self.labels.len()
                ))
            })?;

        let prediction = Prediction {
            label,
            class_index,
            confidence: confidence_percent(probabilities[class_index]),
            probabilities,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Classified as {} ({:.2}%) in {}ms",
            prediction.label, prediction.confidence, prediction.processing_time_ms
        );
        Ok(prediction)
    }

    /// Softmax over the class dimension of a `(1, num_classes)` logit tensor
    fn softmax_row(&self, logits: &Tensor) -> Result<Vec<f32>, ClassifyError> {
        let probs = candle_nn::ops::softmax(logits, D::Minus1)?;
        let row = probs.get(0)?.to_dtype(candle_core::DType::F32)?.to_vec1::<f32>()?;
        if row.len() != self.labels.len() {
            return Err(ModelError::InvalidConfig(format!(
                "model returned {} scores for {} labels",
                row.len(),
                self.labels.len()
            ))
            .into());
        }
        Ok(row)
    }
}

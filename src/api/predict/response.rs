// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction response types

use serde::{Deserialize, Serialize};

use crate::vision::Prediction;

/// Response from POST /predict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    /// Winning class label
    pub predicted_class: String,
    /// Probability of that class as a percentage (0.00-100.00)
    pub confidence: f64,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            predicted_class: prediction.label,
            confidence: prediction.confidence,
        }
    }
}

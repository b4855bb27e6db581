// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod version;
pub mod vision;

pub use api::{create_router, AppState};
pub use config::{AppConfig, ClassifierConfig, DeviceKind, ServerConfig};
pub use vision::{ClassificationService, ImageClassifier, Prediction, VisionTransformer, VitConfig};

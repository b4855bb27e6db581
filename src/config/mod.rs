// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by `main`).

use anyhow::{Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::vision::vit::VitConfig;

/// Default class labels, in the order of the model's output logits
pub const DEFAULT_CLASS_LABELS: [&str; 3] = ["advanced_glucoma", "early_glucoma", "normal"];

/// Default maximum upload size (10MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("img_size {img_size} is not divisible by patch_size {patch_size}")]
    PatchGrid { img_size: usize, patch_size: usize },

    #[error("embed_dim {embed_dim} is not divisible by num_heads {num_heads}")]
    HeadSplit { embed_dim: usize, num_heads: usize },

    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },

    #[error("class_labels has {labels} entries but num_classes is {num_classes}")]
    LabelCount { labels: usize, num_classes: usize },

    #[error("normalization_std[{0}] must be positive")]
    NonPositiveStd(usize),

    #[error("unknown device '{0}', expected auto, cpu or cuda")]
    UnknownDevice(String),
}

/// Where the model runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CUDA device 0 when available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DeviceKind {
    pub fn to_device(self) -> candle_core::Result<Device> {
        match self {
            DeviceKind::Auto => Device::cuda_if_available(0),
            DeviceKind::Cpu => Ok(Device::Cpu),
            DeviceKind::Cuda => Device::new_cuda(0),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DeviceKind::Auto),
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" | "gpu" => Ok(DeviceKind::Cuda),
            other => Err(ConfigError::UnknownDevice(other.to_string())),
        }
    }
}

/// Model architecture, label set, weights location and input normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub img_size: usize,
    pub patch_size: usize,
    pub embed_dim: usize,
    pub depth: usize,
    pub num_heads: usize,
    pub mlp_dim: usize,
    pub num_classes: usize,
    /// Position `i` names output logit `i`; must match the training order
    pub class_labels: Vec<String>,
    pub weights_path: PathBuf,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    pub device: DeviceKind,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            img_size: 224,
            patch_size: 16,
            embed_dim: 384,
            depth: 4,
            num_heads: 4,
            mlp_dim: 1024,
            num_classes: DEFAULT_CLASS_LABELS.len(),
            class_labels: DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect(),
            weights_path: PathBuf::from("./vit_fundus1.pth"),
            normalization_mean: [0.5; 3],
            normalization_std: [0.5; 3],
            device: DeviceKind::Auto,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("img_size", self.img_size),
            ("patch_size", self.patch_size),
            ("embed_dim", self.embed_dim),
            ("depth", self.depth),
            ("num_heads", self.num_heads),
            ("mlp_dim", self.mlp_dim),
            ("num_classes", self.num_classes),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.img_size % self.patch_size != 0 {
            return Err(ConfigError::PatchGrid {
                img_size: self.img_size,
                patch_size: self.patch_size,
            });
        }

        if self.embed_dim % self.num_heads != 0 {
            return Err(ConfigError::HeadSplit {
                embed_dim: self.embed_dim,
                num_heads: self.num_heads,
            });
        }

        if self.class_labels.len() != self.num_classes {
            return Err(ConfigError::LabelCount {
                labels: self.class_labels.len(),
                num_classes: self.num_classes,
            });
        }

        if let Some(channel) = self.normalization_std.iter().position(|s| *s <= 0.0) {
            return Err(ConfigError::NonPositiveStd(channel));
        }

        Ok(())
    }

    /// Architecture portion of the configuration
    pub fn vit_config(&self) -> VitConfig {
        VitConfig {
            img_size: self.img_size,
            patch_size: self.patch_size,
            in_channels: 3,
            embed_dim: self.embed_dim,
            depth: self.depth,
            num_heads: self.num_heads,
            mlp_dim: self.mlp_dim,
            num_classes: self.num_classes,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override values from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(val) = std::env::var("PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value '{}'", val),
            }
        }

        if let Ok(val) = std::env::var("MAX_UPLOAD_BYTES") {
            match val.parse() {
                Ok(bytes) => self.server.max_upload_bytes = bytes,
                Err(_) => warn!("Ignoring invalid MAX_UPLOAD_BYTES value '{}'", val),
            }
        }

        if let Ok(path) = std::env::var("WEIGHTS_PATH") {
            self.classifier.weights_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("DEVICE") {
            match val.parse() {
                Ok(device) => self.classifier.device = device,
                Err(e) => warn!("Ignoring DEVICE: {}", e),
            }
        }
    }
}

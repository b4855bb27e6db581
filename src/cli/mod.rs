// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use std::path::PathBuf;

use crate::config::{AppConfig, DeviceKind};

/// Fundus image classifier service
#[derive(Parser, Debug, Default)]
#[command(name = "fundus-classifier")]
#[command(version)]
#[command(about = "Serve a Vision Transformer fundus classifier over HTTP", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "CLASSIFIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Model weights (.pth or .safetensors)
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Device to run the model on (auto, cpu, cuda)
    #[arg(long)]
    pub device: Option<DeviceKind>,
}

impl Cli {
    /// Build the effective configuration: defaults, file, environment, flags
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides();
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(weights) = &self.weights {
            config.classifier.weights_path = weights.clone();
        }
        if let Some(device) = self.device {
            config.classifier.device = device;
        }
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use fundus_classifier::{
    api::{start_server, AppState},
    cli::Cli,
    vision::ClassificationService,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging, defaulting to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        "🚀 Starting {}",
        fundus_classifier::version::get_version_string()
    );

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let classifier_config = &config.classifier;

    tracing::info!(
        "Model: img_size={} patch_size={} embed_dim={} depth={} heads={} mlp_dim={}",
        classifier_config.img_size,
        classifier_config.patch_size,
        classifier_config.embed_dim,
        classifier_config.depth,
        classifier_config.num_heads,
        classifier_config.mlp_dim
    );
    tracing::info!("Classes: {:?}", classifier_config.class_labels);

    // The service cannot run without a valid model; any failure here aborts startup
    let service = tokio::task::spawn_blocking({
        let classifier_config = classifier_config.clone();
        move || ClassificationService::from_config(&classifier_config)
    })
    .await
    .context("Model loading task panicked")??
    .with_max_image_bytes(config.server.max_upload_bytes);

    tracing::info!("✅ Classifier ready");

    start_server(&config.server, AppState::new(service)).await
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end classification with a small real ViT loaded from disk

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use fundus_classifier::{
    config::{ClassifierConfig, DeviceKind},
    vision::{ClassificationService, ClassifyError, VisionTransformer},
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn small_config(weights_path: &Path) -> ClassifierConfig {
    ClassifierConfig {
        img_size: 32,
        patch_size: 16,
        embed_dim: 8,
        depth: 2,
        num_heads: 2,
        mlp_dim: 16,
        weights_path: weights_path.to_path_buf(),
        device: DeviceKind::Cpu,
        ..Default::default()
    }
}

/// Helper: Random weights for `small_config`, written as safetensors
fn write_weights(dir: &TempDir, head_bias: Option<[f32; 3]>) -> ClassifierConfig {
    let path = dir.path().join("vit_fundus.safetensors");
    let config = small_config(&path);

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    VisionTransformer::new(&config.vit_config(), vb).unwrap();

    if let Some(bias) = head_bias {
        varmap
            .set_one("head.weight", Tensor::zeros((3, 8), DType::F32, &Device::Cpu).unwrap())
            .unwrap();
        varmap
            .set_one("head.bias", Tensor::new(&bias, &Device::Cpu).unwrap())
            .unwrap();
    }

    varmap.save(&path).unwrap();
    config
}

fn fundus_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = ((x as f32 / width as f32) * 255.0) as u8;
        let g = ((y as f32 / height as f32) * 180.0) as u8;
        *pixel = Rgb([r, g, 60]);
    }
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

#[test]
fn test_load_and_classify() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, None);
    let service = ClassificationService::from_config(&config).unwrap();

    let prediction = service.classify_bytes(&fundus_png(512, 512)).unwrap();

    assert!(service.labels().contains(&prediction.label));
    assert_eq!(service.labels()[prediction.class_index], prediction.label);
    assert!((0.0..=100.0).contains(&prediction.confidence));
    assert_eq!(prediction.probabilities.len(), 3);

    let total: f32 = prediction.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-5, "probabilities sum to {}", total);

    // The winner is the most probable class
    let best = prediction.probabilities[prediction.class_index];
    assert!(prediction.probabilities.iter().all(|p| *p <= best));
}

#[test]
fn test_identical_bytes_identical_prediction() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, None);
    let service = ClassificationService::from_config(&config).unwrap();
    let bytes = fundus_png(300, 200);

    let first = service.classify_bytes(&bytes).unwrap();
    let second = service.classify_bytes(&bytes).unwrap();

    assert_eq!(first.label, second.label);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.probabilities, second.probabilities);
}

#[test]
fn test_reference_logits_through_real_model() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, Some([2.1, 0.4, -1.0]));
    let service = ClassificationService::from_config(&config).unwrap();

    let prediction = service.classify_bytes(&fundus_png(512, 512)).unwrap();

    assert_eq!(prediction.label, "advanced_glucoma");
    assert_eq!(prediction.class_index, 0);
    assert_eq!(prediction.confidence, 81.45);
}

#[test]
fn test_invalid_bytes_rejected_before_inference() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, None);
    let service = ClassificationService::from_config(&config).unwrap();

    let err = service.classify_bytes(b"definitely not a picture").unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidImage(_)));
}

#[test]
fn test_missing_weights_fail_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = small_config(&dir.path().join("absent.pth"));

    assert!(ClassificationService::from_config(&config).is_err());
}

#[test]
fn test_architecture_mismatch_fails_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, None);
    let wider_mlp = ClassifierConfig {
        mlp_dim: 32,
        ..config
    };

    assert!(ClassificationService::from_config(&wider_mlp).is_err());
}

#[test]
fn test_invalid_config_fails_at_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_weights(&dir, None);
    let bad = ClassifierConfig {
        class_labels: vec!["normal".to_string()],
        ..config
    };

    let err = ClassificationService::from_config(&bad).unwrap_err();
    assert!(err.to_string().contains("Invalid classifier configuration"));
}

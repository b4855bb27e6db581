// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction endpoint handler

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use bytes::Bytes;
use tracing::{debug, error, warn};

use super::response::PredictResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::ClassifyError;

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

/// POST /predict - Classify a fundus image
///
/// Accepts a multipart form with the image file under `image`. Any format the
/// decoder recognises is accepted; the image is stretched to the model input
/// size before inference.
///
/// An `image` part without a `filename` is still read as the upload, unlike
/// form handlers that only treat parts with a filename as files.
///
/// # Response
/// - `predicted_class`: Label of the most probable class
/// - `confidence`: Its probability as a percentage, two decimals
///
/// # Errors
/// - 400 Bad Request: no `image` field, undecodable image, malformed multipart
/// - 413 Payload Too Large: body exceeds the configured upload limit
/// - 500 Internal Server Error: inference failed
pub async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!("Predict request is not multipart: {}", rejection);
        ApiError::NoImage
    })?;

    let bytes = read_image_field(&mut multipart).await?.ok_or_else(|| {
        warn!("Predict request has no '{}' field", IMAGE_FIELD);
        ApiError::NoImage
    })?;
    debug!("Received {} byte upload", bytes.len());

    let service = state.classifier.clone();
    let result = tokio::task::spawn_blocking(move || service.classify_bytes(&bytes))
        .await
        .map_err(|e| {
            error!("Inference task failed: {}", e);
            ApiError::InternalError(format!("inference task failed: {}", e))
        })?;

    match result {
        Ok(prediction) => Ok(Json(PredictResponse::from(prediction))),
        Err(ClassifyError::InvalidImage(e)) => {
            warn!("Failed to decode image: {}", e);
            Err(ApiError::InvalidImage(e.to_string()))
        }
        Err(ClassifyError::Inference(e)) => {
            error!("Inference failed: {}", e);
            Err(ApiError::InternalError(e.to_string()))
        }
    }
}

/// Return the bytes of the first `image` field, skipping other fields
async fn read_image_field(multipart: &mut Multipart) -> Result<Option<Bytes>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn multipart_error(e: MultipartError) -> ApiError {
    warn!("Failed to read multipart body: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::InvalidRequest(e.body_text())
    }
}

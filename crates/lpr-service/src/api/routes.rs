use crate::error::ApiError;
use crate::pipeline::grammar;
use crate::state::LprServiceState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::plates::{ParseRequest, PlateRecord, ProcessImageResponse};
use common::validation::{validate_plate_text, validate_upload};
use serde_json::json;

/// Multipart field carrying the image
const UPLOAD_FIELD: &str = "file";

/// Locate and read every plate in an uploaded image
pub async fn process_image(
    State(state): State<LprServiceState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessImageResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }

    let bytes =
        upload.ok_or_else(|| ApiError::bad_request(format!("missing multipart field '{}'", UPLOAD_FIELD)))?;

    let max_bytes = state.max_upload_bytes();
    if bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "uploaded file exceeds maximum size of {} bytes",
            max_bytes
        )));
    }
    let signature = validate_upload(&bytes, max_bytes).map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::debug!(
        size = bytes.len(),
        format = signature.as_str(),
        node_id = state.node_id(),
        "image received"
    );

    let response = state.pipeline().process_bytes(&bytes).await?;

    tracing::info!(
        detections = response.detections.len(),
        plates = ?response.detections.iter().map(|d| d.plate_number.as_str()).collect::<Vec<_>>(),
        "image processed"
    );

    Ok(Json(response))
}

/// Parse a plate string without an image
pub async fn parse_plate(Json(request): Json<ParseRequest>) -> Result<Json<PlateRecord>, ApiError> {
    validate_plate_text(&request.text).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(grammar::parse(&request.text)))
}

/// Liveness check endpoint
pub async fn healthz(State(state): State<LprServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lpr-service",
            "node_id": state.node_id(),
            "version": common::VERSION
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<LprServiceState>) -> impl IntoResponse {
    let pipeline = state.pipeline();
    let detector_ready = match pipeline.health_check().await {
        Ok(ready) => ready,
        Err(e) => {
            tracing::warn!("Detector health check failed: {}", e);
            false
        }
    };

    let status = if detector_ready { "ready" } else { "not ready" };
    let body = json!({
        "status": status,
        "detector": pipeline.detector_name(),
        "recognizer": pipeline.analyzer().recognizer_name(),
        "variant_profile": pipeline.config().variant_profile,
    });

    if detector_ready {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = telemetry::metrics::REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match String::from_utf8(buffer) {
        Ok(s) => s.into_response(),
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to convert metrics").into_response()
        }
    }
}

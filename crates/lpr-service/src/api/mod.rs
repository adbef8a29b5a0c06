pub mod routes;

use crate::state::LprServiceState;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the API router
pub fn router(state: LprServiceState) -> Router {
    let body_limit = state.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Recognition endpoints
        .route("/process-image", post(routes::process_image))
        .route("/v1/parse", post(routes::parse_plate))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy admitting the web client origin
pub fn cors_layer(allowed_origin: &str) -> Result<CorsLayer> {
    let origin = allowed_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid allowed origin '{}'", allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::engine::mock::{MockPlateDetector, ScriptedRecognizer};
    use crate::orchestrator::LprPipeline;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use common::plates::{PlateRecord, ProcessImageResponse, UNDETECTED_PLATE};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> LprServiceState {
        let pipeline = LprPipeline::new(
            Arc::new(MockPlateDetector::empty()),
            Arc::new(ScriptedRecognizer::silent()),
            PipelineConfig::default(),
        );
        LprServiceState::new("node-a".to_string(), pipeline, 1024 * 1024)
    }

    fn parse_request(text: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/parse")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": text }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn parse_returns_record() {
        let app = router(test_state());

        let resp = app.oneshot(parse_request("29-A 1-234.56")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let record: PlateRecord = serde_json::from_slice(&bytes).unwrap();
        assert!(record.is_valid);
        assert_eq!(record.serial, "A1");
        assert_eq!(record.number, "234.56");
    }

    #[tokio::test]
    async fn parse_rejects_overlong_text() {
        let app = router(test_state());

        let resp = app
            .oneshot(parse_request(&"9".repeat(500)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    fn multipart_png_request() -> Request<Body> {
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::new(64, 32))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();

        let boundary = "plate-upload-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"car.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&png.into_inner());
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/process-image")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn process_image_route_is_served() {
        let app = router(test_state());

        let resp = app.oneshot(multipart_png_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ProcessImageResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.detections.is_empty());
        assert_eq!(body.error.as_deref(), Some(UNDETECTED_PLATE));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = router(test_state());

        let req = Request::builder()
            .uri("/v1/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = router(test_state()).layer(cors_layer("http://localhost:3000").unwrap());

        let req = Request::builder()
            .uri("/healthz")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[test]
    fn cors_rejects_invalid_origin() {
        assert!(cors_layer("bad\norigin").is_err());
    }
}

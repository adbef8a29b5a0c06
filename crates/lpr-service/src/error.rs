use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure conditions of the recognition pipeline.
///
/// `analyze_crop` only fails on an unusable crop or a lost blocking task.
/// Empty recognition and unparseable text are carried as sentinel values and
/// flags, and these variants name them for logs and metric labels.
#[derive(Debug, Error)]
pub enum LprError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no variant produced readable text")]
    RecognitionEmpty,

    #[error("text '{0}' matches no plate grammar")]
    NoStructuralMatch(String),

    #[error("transform '{variant}' failed: {reason}")]
    Transform {
        variant: &'static str,
        reason: String,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl LprError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn transform(variant: &'static str, reason: impl Into<String>) -> Self {
        Self::Transform {
            variant,
            reason: reason.into(),
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LprError::InvalidInput(_) => "invalid_input",
            LprError::RecognitionEmpty => "recognition_empty",
            LprError::NoStructuralMatch(_) => "no_structural_match",
            LprError::Transform { .. } => "transform",
            LprError::Model(_) => "model",
            LprError::Image(_) => "image",
        }
    }
}

/// HTTP-facing error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let message = match self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) | ApiError::Internal(msg) => {
                msg
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<LprError> for ApiError {
    fn from(err: LprError) -> Self {
        match err {
            LprError::InvalidInput(_) | LprError::Image(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

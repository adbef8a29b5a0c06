pub mod mock;
pub mod onnx;

use crate::pipeline::recognition::RecognizedSpan;
use crate::pipeline::variants::Variant;
use anyhow::Result;
use async_trait::async_trait;
use common::plates::BoundingBox;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Plate location reported by a detector, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// Locates plates in a full image
#[async_trait]
pub trait PlateDetector: Send + Sync {
    /// Identifier reported in logs and metrics
    fn name(&self) -> &'static str;

    /// Detect plate regions. Boxes may extend past the image; callers clip.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;

    /// Health check - verify the detector is operational
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Reads text from one preprocessed plate variant
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Identifier reported as `ocr_engine_used`
    fn name(&self) -> &'static str;

    /// Recognize the spans of text in a variant. An empty list means nothing
    /// was read.
    async fn recognize(&self, variant: &Variant) -> Result<Vec<RecognizedSpan>>;
}

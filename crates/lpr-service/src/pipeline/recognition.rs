use crate::engine::TextRecognizer;
use crate::pipeline::ranking::Candidate;
use crate::pipeline::variants::Variant;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

/// One line or span reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedSpan {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Recognizer output for one variant collapsed to a single read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }

    /// Join span texts with single spaces and average their confidences.
    pub fn from_spans(spans: &[RecognizedSpan]) -> Self {
        let kept: Vec<&RecognizedSpan> = spans.iter().filter(|s| !s.text.trim().is_empty()).collect();
        if kept.is_empty() {
            return Self::empty();
        }

        let text = kept
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");

        let mean = kept.iter().map(|s| s.confidence).sum::<f32>() / kept.len() as f32;
        let confidence = if mean.is_nan() { 0.0 } else { mean.clamp(0.0, 1.0) };

        Self { text, confidence }
    }
}

/// Recognize every variant with at most `concurrency` calls in flight.
///
/// Candidates come back in variant order regardless of completion order. A
/// recognizer failure on one variant counts as an empty read for it. The
/// returned future owns its inputs, so it can be spawned or held across
/// handler awaits.
pub fn recognize_variants(
    recognizer: Arc<dyn TextRecognizer>,
    variants: Vec<Variant>,
    concurrency: usize,
) -> BoxFuture<'static, Vec<Candidate>> {
    stream::iter(variants)
        .map(move |variant| recognize_one(Arc::clone(&recognizer), variant).boxed())
        .buffered(concurrency.max(1))
        .collect()
        .boxed()
}

async fn recognize_one(recognizer: Arc<dyn TextRecognizer>, variant: Variant) -> Candidate {
    let result = match recognizer.recognize(&variant).await {
        Ok(spans) => RecognitionResult::from_spans(&spans),
        Err(e) => {
            warn!(
                variant = variant.name,
                recognizer = recognizer.name(),
                error = %e,
                "recognition failed"
            );
            RecognitionResult::empty()
        }
    };
    trace!(variant = variant.name, text = %result.text, confidence = result.confidence, "variant read");
    Candidate::new(result.text, result.confidence, variant.name)
}

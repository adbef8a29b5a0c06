/// Deterministic detector and recognizer doubles for tests and demo mode
use super::{PlateDetector, RawDetection, TextRecognizer};
use crate::pipeline::recognition::RecognizedSpan;
use crate::pipeline::variants::Variant;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::plates::BoundingBox;
use image::{DynamicImage, GenericImageView};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Detector returning a fixed set of boxes
#[derive(Debug, Clone, Default)]
pub struct MockPlateDetector {
    detections: Vec<RawDetection>,
    whole_image: bool,
    healthy: bool,
}

impl MockPlateDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            whole_image: false,
            healthy: true,
        }
    }

    /// Detector that finds nothing
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Detector that reports the full frame as one plate with confidence 1
    pub fn whole_image() -> Self {
        Self {
            whole_image: true,
            ..Self::empty()
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }
}

#[async_trait]
impl PlateDetector for MockPlateDetector {
    fn name(&self) -> &'static str {
        "mock_detector"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        if self.whole_image {
            let (width, height) = image.dimensions();
            return Ok(vec![RawDetection::new(BoundingBox::new(0, 0, width, height), 1.0)]);
        }
        Ok(self.detections.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.healthy)
    }
}

/// Recognizer answering from a script keyed by variant name
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    default: Vec<RecognizedSpan>,
    scripts: HashMap<String, Vec<RecognizedSpan>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    /// Recognizer that reads nothing on any variant
    pub fn silent() -> Self {
        Self::default()
    }

    /// Answer `spans` for every variant without its own script
    pub fn with_default(spans: Vec<RecognizedSpan>) -> Self {
        Self {
            default: spans,
            ..Self::default()
        }
    }

    pub fn script(mut self, variant: &str, spans: Vec<RecognizedSpan>) -> Self {
        self.scripts.insert(variant.to_string(), spans);
        self
    }

    /// Delay the answer for one variant
    pub fn delay(mut self, variant: &str, delay: Duration) -> Self {
        self.delays.insert(variant.to_string(), delay);
        self
    }

    /// Return an error when asked to read this variant
    pub fn fail_on(mut self, variant: &str) -> Self {
        self.failing.insert(variant.to_string());
        self
    }

    /// Number of recognize calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    fn name(&self) -> &'static str {
        "scripted_recognizer"
    }

    async fn recognize(&self, variant: &Variant) -> Result<Vec<RecognizedSpan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(variant.name) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(variant.name) {
            bail!("scripted failure on variant {}", variant.name);
        }

        Ok(self
            .scripts
            .get(variant.name)
            .unwrap_or(&self.default)
            .clone())
    }
}

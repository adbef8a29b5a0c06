use crate::engine::onnx::OnnxEngineConfig;
use crate::pipeline::variants::{VariantProfile, MIN_CROP_SIDE};
use anyhow::{bail, Context, Result};
use common::validation::DEFAULT_MAX_UPLOAD_BYTES;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Which model backend the service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// ONNX Runtime detector and recognizer
    Onnx,
    /// In-memory doubles, for demos without model files
    Mock,
}

impl EngineKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "mock" => Ok(Self::Mock),
            other => bail!("Invalid LPR_ENGINE '{}' (expected onnx or mock)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this service instance
    pub node_id: String,

    /// Origin allowed by CORS (the web client)
    pub allowed_origin: String,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    pub engine: EngineKind,

    pub pipeline: PipelineConfig,

    pub onnx: OnnxEngineConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("LPR_SERVICE_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string());

        let node_id = lookup("NODE_ID").unwrap_or_else(|| {
            format!(
                "lpr-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let allowed_origin =
            lookup("LPR_ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let max_upload_bytes = lookup("LPR_MAX_UPLOAD_BYTES")
            .map(|v| v.parse::<usize>().context("Invalid LPR_MAX_UPLOAD_BYTES"))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let engine = lookup("LPR_ENGINE")
            .map(|v| EngineKind::parse(&v))
            .transpose()?
            .unwrap_or(EngineKind::Onnx);

        let pipeline = match lookup("LPR_PIPELINE_CONFIG") {
            Some(path) => PipelineConfig::load(&path)?,
            None => PipelineConfig::default(),
        };
        pipeline.validate()?;

        let mut onnx = OnnxEngineConfig {
            max_detections: pipeline.max_detections,
            ..OnnxEngineConfig::default()
        };
        onnx.apply_overrides(&lookup);

        Ok(Self {
            bind_addr,
            node_id,
            allowed_origin,
            max_upload_bytes,
            engine,
            pipeline,
            onnx,
        })
    }
}

/// Tunables of the recognition flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Variant set applied to every crop
    #[serde(default)]
    pub variant_profile: VariantProfile,

    /// Crops with a shorter side below this are upscaled
    #[serde(default = "default_min_crop_side")]
    pub min_crop_side: u32,

    /// Recognizer calls in flight per crop
    #[serde(default = "default_recognition_concurrency")]
    pub recognition_concurrency: usize,

    /// Detections below this confidence are dropped before cropping
    #[serde(default = "default_detection_confidence_threshold")]
    pub detection_confidence_threshold: f32,

    /// Clipped boxes with a smaller area (px²) are dropped
    #[serde(default = "default_min_box_area")]
    pub min_box_area: u64,

    /// Maximum number of plates analyzed per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Return the annotated image as a data URL
    #[serde(default = "default_annotate")]
    pub annotate: bool,
}

fn default_min_crop_side() -> u32 {
    MIN_CROP_SIDE
}

fn default_recognition_concurrency() -> usize {
    4
}

fn default_detection_confidence_threshold() -> f32 {
    0.4
}

fn default_min_box_area() -> u64 {
    100
}

fn default_max_detections() -> usize {
    10
}

fn default_annotate() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant_profile: VariantProfile::default(),
            min_crop_side: default_min_crop_side(),
            recognition_concurrency: default_recognition_concurrency(),
            detection_confidence_threshold: default_detection_confidence_threshold(),
            min_box_area: default_min_box_area(),
            max_detections: default_max_detections(),
            annotate: default_annotate(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid pipeline config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection_confidence_threshold) {
            bail!(
                "detection_confidence_threshold must be within [0, 1], got {}",
                self.detection_confidence_threshold
            );
        }
        if self.min_crop_side == 0 {
            bail!("min_crop_side must be positive");
        }
        if self.recognition_concurrency == 0 {
            bail!("recognition_concurrency must be at least 1");
        }
        if self.max_detections == 0 {
            bail!("max_detections must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_pipeline_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.variant_profile, VariantProfile::Standard);
        assert_eq!(config.min_crop_side, 50);
        assert_eq!(config.recognition_concurrency, 4);
        assert_eq!(config.detection_confidence_threshold, 0.4);
        assert_eq!(config.min_box_area, 100);
        assert_eq!(config.max_detections, 10);
        assert!(config.annotate);
    }

    #[test]
    fn test_pipeline_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"variant_profile": "extended", "annotate": false}"#).unwrap();
        assert_eq!(config.variant_profile, VariantProfile::Extended);
        assert!(!config.annotate);
        assert_eq!(config.max_detections, 10);
    }

    #[test]
    fn test_pipeline_validation() {
        let config = PipelineConfig {
            detection_confidence_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            recognition_concurrency: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[("NODE_ID", "lpr-test")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.node_id, "lpr-test");
        assert_eq!(config.allowed_origin, "http://localhost:3000");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.engine, EngineKind::Onnx);
    }

    #[test]
    fn test_service_config_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("LPR_SERVICE_ADDR", "127.0.0.1:8090"),
            ("LPR_MAX_UPLOAD_BYTES", "2048"),
            ("LPR_ENGINE", "mock"),
            ("LPR_EXECUTION_PROVIDER", "TensorRT"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8090");
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.engine, EngineKind::Mock);
        assert_eq!(config.onnx.execution_provider, "TensorRT");
        assert!(config.node_id.starts_with("lpr-service-"));

        assert!(ServiceConfig::from_lookup(lookup(&[("LPR_ENGINE", "tflite")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("LPR_MAX_UPLOAD_BYTES", "ten")])).is_err());
    }

    #[test]
    fn test_missing_pipeline_file() {
        let result = ServiceConfig::from_lookup(lookup(&[(
            "LPR_PIPELINE_CONFIG",
            "/nonexistent/pipeline.json",
        )]));
        assert!(result.is_err());
    }
}

/// ONNX Runtime model engines
///
/// Two models back the recognition pipeline:
/// 1. Detector: locates plates in the full image (YOLOv8 style `[1, 5, N]` output)
/// 2. Recognizer: reads one plate variant (CRNN style, CTC greedy decoding)
use super::{PlateDetector, RawDetection, TextRecognizer};
use crate::pipeline::recognition::RecognizedSpan;
use crate::pipeline::variants::Variant;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use common::plates::BoundingBox;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use telemetry::metrics::{LPR_INFERENCE_TIME, LPR_MODELS_LOADED};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxEngineConfig {
    /// Path to the plate detection ONNX model file
    #[serde(default = "default_detector_model_path")]
    pub detector_model_path: String,

    /// Path to the text recognition ONNX model file
    #[serde(default = "default_recognizer_model_path")]
    pub recognizer_model_path: String,

    /// Detector input size (width and height)
    #[serde(default = "default_detector_input_size")]
    pub detector_input_size: u32,

    /// Scores below this are dropped before NMS
    #[serde(default = "default_detector_min_score")]
    pub detector_min_score: f32,

    /// IoU (Intersection over Union) threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of plates returned per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Recognizer input width
    #[serde(default = "default_recognizer_input_width")]
    pub recognizer_input_width: u32,

    /// Recognizer input height
    #[serde(default = "default_recognizer_input_height")]
    pub recognizer_input_height: u32,

    /// Character vocabulary of the recognizer, CTC blank excluded
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_detector_model_path() -> String {
    "models/plate_detector.onnx".to_string()
}

fn default_recognizer_model_path() -> String {
    "models/plate_recognizer.onnx".to_string()
}

fn default_detector_input_size() -> u32 {
    640
}

fn default_detector_min_score() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    10
}

fn default_recognizer_input_width() -> u32 {
    200
}

fn default_recognizer_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    // CTC blank is index 0, so vocab starts at index 1
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.".to_string()
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for OnnxEngineConfig {
    fn default() -> Self {
        Self {
            detector_model_path: default_detector_model_path(),
            recognizer_model_path: default_recognizer_model_path(),
            detector_input_size: default_detector_input_size(),
            detector_min_score: default_detector_min_score(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            recognizer_input_width: default_recognizer_input_width(),
            recognizer_input_height: default_recognizer_input_height(),
            char_vocab: default_char_vocab(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

impl OnnxEngineConfig {
    /// Apply `LPR_EXECUTION_PROVIDER`, `LPR_DEVICE_ID`, `LPR_DETECTOR_MODEL`
    /// and `LPR_RECOGNIZER_MODEL`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("LPR_EXECUTION_PROVIDER") {
            self.execution_provider = provider;
        }
        if let Some(id) = lookup("LPR_DEVICE_ID").and_then(|v| v.parse::<i32>().ok()) {
            self.device_id = id;
        }
        if let Some(path) = lookup("LPR_DETECTOR_MODEL") {
            self.detector_model_path = path;
        }
        if let Some(path) = lookup("LPR_RECOGNIZER_MODEL") {
            self.recognizer_model_path = path;
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

fn session_builder(config: &OnnxEngineConfig) -> Result<SessionBuilder> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")
}

/// Create a session, falling back TensorRT -> CUDA -> CPU
fn create_session(config: &OnnxEngineConfig, model_path: &str) -> Result<(Session, String)> {
    if !Path::new(model_path).exists() {
        bail!("model file not found: {}", model_path);
    }

    match config.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => {
            tracing::info!(model = model_path, "attempting TensorRT");
            let result = session_builder(config)?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set execution providers")?
                .commit_from_file(model_path);

            match result {
                Ok(session) => Ok((session, "TensorRT".to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, "TensorRT failed, trying CUDA");
                    try_cuda(config, model_path)
                }
            }
        }
        "CUDA" => try_cuda(config, model_path),
        _ => try_cpu(config, model_path),
    }
}

fn try_cuda(config: &OnnxEngineConfig, model_path: &str) -> Result<(Session, String)> {
    tracing::info!(model = model_path, "attempting CUDA");
    let result = session_builder(config)?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => Ok((session, "CUDA".to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "CUDA failed, using CPU");
            try_cpu(config, model_path)
        }
    }
}

fn try_cpu(config: &OnnxEngineConfig, model_path: &str) -> Result<(Session, String)> {
    let session = session_builder(config)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path))?;
    Ok((session, "CPU".to_string()))
}

/// Run a single-input model and return its first matching f32 output
fn run_model(
    session: &Mutex<Session>,
    input: Array<f32, IxDyn>,
    output_names: &[&str],
) -> Result<Array<f32, IxDyn>> {
    let input_tensor = Value::from_array(input)?;

    let mut session = session
        .lock()
        .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let output_value = output_names
        .iter()
        .find_map(|name| outputs.get(*name))
        .with_context(|| format!("No output tensor found (tried: {})", output_names.join(", ")))?;
    let (shape, data) = output_value.try_extract_tensor::<f32>()?;

    let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
    Ok(Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?)
}

// ============================================================================
// Detector
// ============================================================================

pub struct OnnxPlateDetector {
    config: OnnxEngineConfig,
    session: Mutex<Session>,
    execution_provider: String,
}

impl OnnxPlateDetector {
    pub fn load(config: OnnxEngineConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config, &config.detector_model_path)?;
        LPR_MODELS_LOADED.inc();

        tracing::info!(
            path = %config.detector_model_path,
            provider = %execution_provider,
            device = config.device_id,
            "plate detector loaded"
        );

        Ok(Self {
            config,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    /// Resize to the square model input, NCHW, normalized to [0, 1]
    fn preprocess(&self, image: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.config.detector_input_size;
        let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        input
    }
}

#[async_trait]
impl PlateDetector for OnnxPlateDetector {
    fn name(&self) -> &'static str {
        "onnx_detector"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let (width, height) = image.dimensions();
        let input = self.preprocess(image);

        let start = Instant::now();
        let output = run_model(&self.session, input, &["output0", "output", "boxes"])?;
        LPR_INFERENCE_TIME
            .with_label_values(&["detector", self.execution_provider.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let candidates = decode_yolo(
            &output,
            self.config.detector_input_size,
            width,
            height,
            self.config.detector_min_score,
        )?;

        let mut kept = nms(candidates, self.config.iou_threshold);
        kept.truncate(self.config.max_detections);
        Ok(kept)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.session.lock().is_ok())
    }
}

/// Decode a YOLOv8 `[batch, 5, predictions]` tensor of (cx, cy, w, h, score)
/// into boxes in source image coordinates
pub fn decode_yolo(
    output: &Array<f32, IxDyn>,
    input_size: u32,
    width: u32,
    height: u32,
    min_score: f32,
) -> Result<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[1] < 5 {
        bail!("unexpected detector output shape {:?}", shape);
    }

    let scale_x = width as f32 / input_size as f32;
    let scale_y = height as f32 / input_size as f32;

    let mut boxes = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, 4, i]];
        if confidence.is_nan() || confidence < min_score {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, width as f32) as u32;
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, height as f32) as u32;
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, width as f32) as u32;
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, height as f32) as u32;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        boxes.push(RawDetection::new(BoundingBox::new(x1, y1, x2, y2), confidence));
    }

    Ok(boxes)
}

/// Greedy Non-Maximum Suppression, highest confidence first
pub fn nms(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| k.bbox.iou(&candidate.bbox) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

// ============================================================================
// Recognizer
// ============================================================================

pub struct OnnxTextRecognizer {
    config: OnnxEngineConfig,
    vocab: Vec<char>,
    session: Mutex<Session>,
    execution_provider: String,
}

impl OnnxTextRecognizer {
    pub fn load(config: OnnxEngineConfig) -> Result<Self> {
        let (session, execution_provider) = create_session(&config, &config.recognizer_model_path)?;
        LPR_MODELS_LOADED.inc();

        tracing::info!(
            path = %config.recognizer_model_path,
            provider = %execution_provider,
            "text recognizer loaded"
        );

        Ok(Self {
            vocab: config.char_vocab.chars().collect(),
            config,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    /// Grayscale, resized to the model input, NCHW, normalized to [0, 1]
    fn preprocess(&self, image: &DynamicImage) -> Array<f32, IxDyn> {
        let width = self.config.recognizer_input_width;
        let height = self.config.recognizer_input_height;
        let gray = image.resize_exact(width, height, FilterType::Triangle).to_luma8();

        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
        for (x, y, pixel) in gray.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        }
        input
    }
}

#[async_trait]
impl TextRecognizer for OnnxTextRecognizer {
    fn name(&self) -> &'static str {
        "onnx_ctc_recognizer"
    }

    async fn recognize(&self, variant: &Variant) -> Result<Vec<RecognizedSpan>> {
        let input = self.preprocess(&variant.image);

        let start = Instant::now();
        let output = run_model(&self.session, input, &["output", "output0", "logits"])?;
        LPR_INFERENCE_TIME
            .with_label_values(&["recognizer", self.execution_provider.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let (text, confidence) = ctc_decode(&output, &self.vocab)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RecognizedSpan::new(text, confidence)])
    }
}

/// CTC greedy decoding over `[batch, timesteps, classes]` probabilities.
///
/// Blank is class 0 and repeated classes collapse. The confidence is the mean
/// of the winning probabilities of emitted characters, 0 when nothing is
/// emitted.
pub fn ctc_decode(output: &Array<f32, IxDyn>, vocab: &[char]) -> Result<(String, f32)> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 {
        bail!("unexpected recognizer output shape {:?}", shape);
    }
    let (sequence_length, classes) = (shape[1], shape[2]);

    let mut text = String::new();
    let mut prob_sum = 0.0f32;
    let mut prev_idx = 0;

    for t in 0..sequence_length {
        let mut max_prob = f32::NEG_INFINITY;
        let mut max_idx = 0;
        for c in 0..classes {
            let prob = output[[0, t, c]];
            if prob > max_prob {
                max_prob = prob;
                max_idx = c;
            }
        }

        if max_idx > 0 && max_idx != prev_idx {
            if let Some(&ch) = vocab.get(max_idx - 1) {
                text.push(ch);
                prob_sum += max_prob;
            }
        }
        prev_idx = max_idx;
    }

    let emitted = text.chars().count();
    let confidence = if emitted == 0 {
        0.0
    } else {
        (prob_sum / emitted as f32).clamp(0.0, 1.0)
    };
    Ok((text, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vocab() -> Vec<char> {
        default_char_vocab().chars().collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = OnnxEngineConfig::default();
        assert_eq!(config.detector_input_size, 640);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.recognizer_input_width, 200);
        assert_eq!(config.recognizer_input_height, 64);
        assert!(config.char_vocab.contains("0123456789"));
        assert!(config.char_vocab.contains('.'));

        let parsed: OnnxEngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.max_detections, 10);
        assert_eq!(parsed.execution_provider, "CPU");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("LPR_EXECUTION_PROVIDER", "CUDA"),
            ("LPR_DEVICE_ID", "2"),
            ("LPR_RECOGNIZER_MODEL", "/models/ocr.onnx"),
        ]
        .into_iter()
        .collect();

        let mut config = OnnxEngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.execution_provider, "CUDA");
        assert_eq!(config.device_id, 2);
        assert_eq!(config.recognizer_model_path, "/models/ocr.onnx");
        assert_eq!(config.detector_model_path, default_detector_model_path());
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let config = OnnxEngineConfig {
            detector_model_path: "/nonexistent/detector.onnx".to_string(),
            ..OnnxEngineConfig::default()
        };
        let err = OnnxPlateDetector::load(config).err().unwrap();
        assert!(err.to_string().contains("model file not found"));
    }

    #[test]
    fn test_decode_yolo_scales_and_filters() {
        // Two predictions on a 640 input: one confident, one below the floor
        let data = vec![
            320.0, 100.0, // cx
            320.0, 100.0, // cy
            64.0, 10.0, // w
            32.0, 10.0, // h
            0.9, 0.1, // score
        ];
        let output = Array::from_shape_vec(IxDyn(&[1, 5, 2]), data).unwrap();

        let boxes = decode_yolo(&output, 640, 1280, 640, 0.25).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].bbox, BoundingBox::new(576, 304, 704, 336));
        assert_eq!(boxes[0].confidence, 0.9);

        let bad = Array::from_shape_vec(IxDyn(&[1, 4, 1]), vec![0.0; 4]).unwrap();
        assert!(decode_yolo(&bad, 640, 640, 640, 0.25).is_err());
    }

    #[test]
    fn test_nms() {
        let boxes = vec![
            RawDetection::new(BoundingBox::new(10, 10, 110, 40), 0.8),
            RawDetection::new(BoundingBox::new(15, 12, 115, 42), 0.9),
            RawDetection::new(BoundingBox::new(200, 200, 300, 230), 0.85),
        ];

        let kept = nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.85);
    }

    #[test]
    fn test_ctc_decode() {
        let vocab = vocab();
        let classes = vocab.len() + 1;
        let steps = 6;
        let mut data = vec![0.01f32; steps * classes];

        // blank, '5', '5', blank, '1', 'A' ('5' is class 6, '1' class 2, 'A' class 11)
        data[0] = 0.9;
        data[classes + 6] = 0.8;
        data[2 * classes + 6] = 0.7;
        data[3 * classes] = 0.9;
        data[4 * classes + 2] = 0.6;
        data[5 * classes + 11] = 1.0;

        let output = Array::from_shape_vec(IxDyn(&[1, steps, classes]), data).unwrap();
        let (text, confidence) = ctc_decode(&output, &vocab).unwrap();

        assert_eq!(text, "51A");
        assert!((confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ctc_decode_all_blank() {
        let vocab = vocab();
        let classes = vocab.len() + 1;
        let mut data = vec![0.0f32; 3 * classes];
        for t in 0..3 {
            data[t * classes] = 1.0;
        }
        let output = Array::from_shape_vec(IxDyn(&[1, 3, classes]), data).unwrap();
        assert_eq!(ctc_decode(&output, &vocab).unwrap(), (String::new(), 0.0));
    }
}

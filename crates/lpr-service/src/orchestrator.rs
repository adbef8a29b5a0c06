//! Full-image recognition flow: detect, select boxes, analyze every crop,
//! annotate.

use crate::config::PipelineConfig;
use crate::engine::{PlateDetector, RawDetection, TextRecognizer};
use crate::error::LprError;
use crate::pipeline::analyzer::PlateAnalyzer;
use crate::pipeline::variants::VariantGenerator;
use base64::{prelude::BASE64_STANDARD, Engine};
use common::plates::{PlateDetection, ProcessImageResponse, UNDETECTED_PLATE};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use std::io::Cursor;
use std::sync::Arc;
use telemetry::metrics::{LPR_PLATES_DETECTED, LPR_REQUESTS, LPR_REQUEST_DURATION};
use tracing::{info, warn};

const READ_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNREAD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BORDER_WIDTH: u32 = 2;

pub struct LprPipeline {
    detector: Arc<dyn PlateDetector>,
    analyzer: PlateAnalyzer,
    config: PipelineConfig,
}

impl LprPipeline {
    pub fn new(
        detector: Arc<dyn PlateDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        config: PipelineConfig,
    ) -> Self {
        let generator =
            VariantGenerator::new(config.variant_profile).with_min_side(config.min_crop_side);
        let analyzer = PlateAnalyzer::new(recognizer)
            .with_generator(generator)
            .with_concurrency(config.recognition_concurrency);

        Self {
            detector,
            analyzer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &PlateAnalyzer {
        &self.analyzer
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub async fn health_check(&self) -> anyhow::Result<bool> {
        self.detector.health_check().await
    }

    /// Decode an uploaded image and process it
    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<ProcessImageResponse, LprError> {
        let image = image::load_from_memory(bytes)?;
        self.process_image(&image).await
    }

    pub async fn process_image(&self, image: &DynamicImage) -> Result<ProcessImageResponse, LprError> {
        let timer = LPR_REQUEST_DURATION.start_timer();
        let (width, height) = image.dimensions();

        let raw = self
            .detector
            .detect(image)
            .await
            .map_err(|e| LprError::Model(format!("{:#}", e)))?;
        let raw_count = raw.len();
        let boxes = select_boxes(raw, width, height, &self.config);

        info!(
            detector = self.detector.name(),
            width,
            height,
            raw_detections = raw_count,
            kept = boxes.len(),
            "plates located"
        );

        let mut detections = Vec::with_capacity(boxes.len());
        for detection in boxes {
            detections.push(self.read_plate(image, detection).await);
        }
        LPR_PLATES_DETECTED.inc_by(detections.len() as u64);

        let processed_image_url = if self.config.annotate {
            Some(encode_data_url(&annotate(image, &detections))?)
        } else {
            None
        };

        let outcome = if detections.is_empty() {
            "no_plate"
        } else if detections.iter().any(|d| d.plate_analysis.is_some()) {
            "read"
        } else {
            "unreadable"
        };
        LPR_REQUESTS.with_label_values(&[outcome]).inc();
        timer.observe_duration();

        Ok(ProcessImageResponse {
            error: detections.is_empty().then(|| UNDETECTED_PLATE.to_string()),
            detections,
            processed_image_url,
        })
    }

    async fn read_plate(&self, image: &DynamicImage, detection: RawDetection) -> PlateDetection {
        let bbox = detection.bbox;
        let crop = image.crop_imm(bbox.x1, bbox.y1, bbox.width(), bbox.height());

        match self.analyzer.analyze_crop(&crop, detection.confidence).await {
            Ok(analysis) => PlateDetection {
                plate_number: analysis.plate_number,
                confidence_detection: detection.confidence,
                confidence_ocr: analysis.confidence_ocr,
                bounding_box: bbox.to_array(),
                plate_analysis: analysis.plate_analysis,
                color_estimate: Some(analysis.color_estimate),
                ocr_engine_used: Some(self.analyzer.recognizer_name().to_string()),
            },
            Err(e) => {
                warn!(bbox = ?bbox.to_array(), error = %e, "crop could not be analyzed");
                PlateDetection {
                    plate_number: UNDETECTED_PLATE.to_string(),
                    confidence_detection: detection.confidence,
                    confidence_ocr: 0.0,
                    bounding_box: bbox.to_array(),
                    plate_analysis: None,
                    color_estimate: None,
                    ocr_engine_used: None,
                }
            }
        }
    }
}

/// Threshold, clip to the image, drop tiny boxes, keep the most confident
pub fn select_boxes(
    detections: Vec<RawDetection>,
    width: u32,
    height: u32,
    config: &PipelineConfig,
) -> Vec<RawDetection> {
    let mut kept: Vec<RawDetection> = detections
        .into_iter()
        .filter(|d| d.confidence >= config.detection_confidence_threshold)
        .filter_map(|d| {
            d.bbox
                .clip(width, height)
                .map(|bbox| RawDetection::new(bbox, d.confidence))
        })
        .filter(|d| d.bbox.area() >= config.min_box_area)
        .collect();

    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept.truncate(config.max_detections);
    kept
}

/// Outline every detection: green when a plate was read, red otherwise
pub fn annotate(image: &DynamicImage, detections: &[PlateDetection]) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for detection in detections {
        let [x1, y1, x2, y2] = detection.bounding_box;
        let color = if detection.plate_analysis.is_some() {
            READ_COLOR
        } else {
            UNREAD_COLOR
        };

        for inset in 0..BORDER_WIDTH {
            let width = x2.saturating_sub(x1).saturating_sub(2 * inset);
            let height = y2.saturating_sub(y1).saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32).of_size(width, height);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}

/// JPEG-encode as a `data:image/jpeg;base64,...` URL
pub fn encode_data_url(image: &RgbImage) -> Result<String, LprError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(buffer.into_inner())
    ))
}

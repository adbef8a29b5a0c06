use crate::engine::TextRecognizer;
use crate::error::LprError;
use crate::pipeline::color::classify_color;
use crate::pipeline::grammar::parse_with_format;
use crate::pipeline::ranking::rank;
use crate::pipeline::recognition::recognize_variants;
use crate::pipeline::variants::VariantGenerator;
use common::plates::CropAnalysis;
use image::DynamicImage;
use std::sync::Arc;
use telemetry::metrics::{LPR_PARSE_OUTCOMES, LPR_RECOGNITION_DURATION, LPR_VARIANTS_GENERATED};
use tracing::debug;

pub const DEFAULT_RECOGNITION_CONCURRENCY: usize = 4;

/// Variants, recognition, ranking and parsing for one plate crop.
#[derive(Clone)]
pub struct PlateAnalyzer {
    generator: VariantGenerator,
    recognizer: Arc<dyn TextRecognizer>,
    concurrency: usize,
}

impl PlateAnalyzer {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            generator: VariantGenerator::default(),
            recognizer,
            concurrency: DEFAULT_RECOGNITION_CONCURRENCY,
        }
    }

    pub fn with_generator(mut self, generator: VariantGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn recognizer_name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// Analyze one crop.
    ///
    /// Variant generation and color classification run on the blocking pool.
    ///
    /// Fails with `LprError::InvalidInput` for an unusable crop. A crop
    /// nothing could be read from yields the unreadable placeholder with no
    /// `plate_analysis`, and unparseable text yields a record with
    /// `is_valid == false`.
    pub async fn analyze_crop(
        &self,
        crop: &DynamicImage,
        detection_confidence: f32,
    ) -> Result<CropAnalysis, LprError> {
        let generator = self.generator.clone();
        let owned = crop.clone();
        let (variants, color_estimate) = tokio::task::spawn_blocking(move || {
            rayon::join(|| generator.generate(&owned), || classify_color(&owned))
        })
        .await
        .map_err(|e| LprError::Model(format!("variant generation task failed: {e}")))?;
        let variants = variants?;

        for variant in &variants {
            LPR_VARIANTS_GENERATED.with_label_values(&[variant.name]).inc();
        }

        let timer = LPR_RECOGNITION_DURATION.start_timer();
        let candidates =
            recognize_variants(Arc::clone(&self.recognizer), variants, self.concurrency).await;
        timer.observe_duration();

        let outcome = rank(&candidates);

        let plate_analysis = if outcome.is_unreadable() {
            debug!(condition = LprError::RecognitionEmpty.kind(), "no variant produced text");
            None
        } else {
            let (mut record, format) = parse_with_format(&outcome.text);
            LPR_PARSE_OUTCOMES
                .with_label_values(&[
                    format.map_or("none", |f| f.id()),
                    if record.is_valid { "true" } else { "false" },
                ])
                .inc();

            if !record.is_valid {
                debug!(
                    condition = LprError::NoStructuralMatch(String::new()).kind(),
                    text = %outcome.text,
                    "recognized text matches no plate grammar"
                );
            }

            record.detected_color = Some(color_estimate.color);
            Some(record)
        };

        Ok(CropAnalysis {
            plate_number: outcome.text,
            confidence: detection_confidence,
            confidence_ocr: outcome.confidence,
            plate_analysis,
            color_estimate,
            source_variant: outcome.source_variant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::ScriptedRecognizer;
    use crate::pipeline::recognition::RecognizedSpan;
    use common::plates::{PlateColor, UNREADABLE_PLATE};
    use image::{Rgb, RgbImage};

    fn crop() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(120, 40, |x, _| {
            if x % 5 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([240, 240, 240])
            }
        }))
    }

    #[tokio::test]
    async fn test_analyze_reads_and_parses() {
        let recognizer = ScriptedRecognizer::with_default(vec![RecognizedSpan::new("51A12345", 0.8)]);
        let analyzer = PlateAnalyzer::new(Arc::new(recognizer));

        let analysis = analyzer.analyze_crop(&crop(), 0.93).await.unwrap();
        assert_eq!(analysis.plate_number, "51A12345");
        assert_eq!(analysis.confidence, 0.93);
        assert!((analysis.confidence_ocr - 0.8).abs() < 1e-6);
        assert_eq!(analysis.source_variant.as_deref(), Some("original"));

        let record = analysis.plate_analysis.unwrap();
        assert!(record.is_valid);
        assert_eq!(record.province_code, "51");
        assert_eq!(record.detected_color, Some(PlateColor::White));
    }

    #[tokio::test]
    async fn test_analyze_unreadable() {
        let analyzer = PlateAnalyzer::new(Arc::new(ScriptedRecognizer::silent()));

        let analysis = analyzer.analyze_crop(&crop(), 0.5).await.unwrap();
        assert_eq!(analysis.plate_number, UNREADABLE_PLATE);
        assert_eq!(analysis.confidence_ocr, 0.0);
        assert!(analysis.plate_analysis.is_none());
        assert!(analysis.source_variant.is_none());
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_crop() {
        let analyzer = PlateAnalyzer::new(Arc::new(ScriptedRecognizer::silent()));
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));

        let result = analyzer.analyze_crop(&empty, 0.5).await;
        assert!(matches!(result, Err(LprError::InvalidInput(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_analyze_leaves_runtime_thread_free() {
        let analyzer = PlateAnalyzer::new(Arc::new(ScriptedRecognizer::with_default(vec![
            RecognizedSpan::new("30E99999", 0.7),
        ])))
        .with_generator(VariantGenerator::new(crate::pipeline::variants::VariantProfile::Extended));

        let ticker = tokio::spawn(async {
            let mut ticks = 0u32;
            for _ in 0..3 {
                tokio::task::yield_now().await;
                ticks += 1;
            }
            ticks
        });

        let large = DynamicImage::ImageRgb8(RgbImage::from_fn(800, 260, |x, y| {
            if (x / 7 + y / 11) % 3 == 0 {
                Rgb([15, 15, 15])
            } else {
                Rgb([235, 235, 235])
            }
        }));
        let analysis = analyzer.analyze_crop(&large, 0.8).await.unwrap();

        assert_eq!(analysis.plate_number, "30E99999");
        assert!(ticker.is_finished());
        assert_eq!(ticker.await.unwrap(), 3);
    }
}

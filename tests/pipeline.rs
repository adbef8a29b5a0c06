/// Integration tests for the crop pipeline: variants, recognition fan-out,
/// ranking and the analyzer that ties them together
use common::plates::{PlateColor, VehicleType, UNREADABLE_PLATE};
use image::{DynamicImage, Rgb, RgbImage};
use lpr_service::engine::mock::ScriptedRecognizer;
use lpr_service::pipeline::ranking::{rank, Candidate, RankReason};
use lpr_service::pipeline::recognition::{recognize_variants, RecognizedSpan};
use lpr_service::pipeline::{PlateAnalyzer, VariantGenerator, VariantProfile};
use std::sync::Arc;
use std::time::Duration;

/// Light plate with dark vertical strokes
fn plate_crop(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if x % 7 < 2 && y > height / 5 && y < height * 4 / 5 {
            Rgb([20, 20, 20])
        } else {
            Rgb([235, 235, 230])
        }
    }))
}

fn yellow_crop() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(90, 30, Rgb([230, 190, 20])))
}

#[test]
fn test_variant_counts_are_fixed_per_profile() {
    let crop = plate_crop(120, 40);

    for (profile, expected) in [
        (VariantProfile::Compact, 8),
        (VariantProfile::Standard, 11),
        (VariantProfile::Extended, 14),
    ] {
        let variants = VariantGenerator::new(profile).generate(&crop).unwrap();
        assert_eq!(variants.len(), expected, "profile {:?}", profile);
        assert_eq!(variants[0].name, "original");
    }
}

#[test]
fn test_variant_order_is_stable() {
    let generator = VariantGenerator::new(VariantProfile::Extended);
    let first: Vec<_> = generator
        .generate(&plate_crop(80, 24))
        .unwrap()
        .iter()
        .map(|v| v.name)
        .collect();

    for _ in 0..5 {
        let again: Vec<_> = generator
            .generate(&plate_crop(80, 24))
            .unwrap()
            .iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(again, first);
    }
}

#[test]
fn test_small_crops_are_upscaled() {
    let variants = VariantGenerator::new(VariantProfile::Compact)
        .generate(&plate_crop(40, 12))
        .unwrap();

    for variant in &variants {
        assert!(variant.image.width().min(variant.image.height()) >= 50);
    }
}

#[test]
fn test_rank_is_idempotent() {
    let candidates = vec![
        Candidate::new("51A1234", 0.7, "original"),
        Candidate::new("51A12345", 0.9, "otsu"),
        Candidate::new("", 0.95, "grayscale"),
        Candidate::new("5lA12345", 0.4, "sharpen"),
    ];

    let first = rank(&candidates);
    let winner = Candidate::new(
        first.text.clone(),
        first.confidence,
        first.source_variant.clone().unwrap(),
    );
    let mut reranked = vec![winner];
    reranked.extend(candidates.iter().cloned());

    assert_eq!(rank(&reranked).text, first.text);
    assert_eq!(rank(&candidates), first);
}

#[test]
fn test_special_format_beats_confidence() {
    let outcome = rank(&[
        Candidate::new("68G166886", 0.95, "original"),
        Candidate::new("68-G1 668.86", 0.55, "clahe_clip2_tile8"),
    ]);

    assert_eq!(outcome.text, "68-G1 668.86");
    assert_eq!(outcome.reason, RankReason::SpecialFormat);
    assert_eq!(outcome.source_variant.as_deref(), Some("clahe_clip2_tile8"));
}

#[test]
fn test_all_empty_reads_are_unreadable() {
    let candidates: Vec<_> = ["original", "grayscale", "otsu"]
        .into_iter()
        .map(|name| Candidate::new("", 0.0, name))
        .collect();

    let outcome = rank(&candidates);
    assert_eq!(outcome.text, UNREADABLE_PLATE);
    assert_eq!(outcome.confidence, 0.0);
    assert!(outcome.is_unreadable());
}

#[tokio::test]
async fn test_recognition_keeps_variant_order_under_delays() {
    let variants = VariantGenerator::new(VariantProfile::Compact)
        .generate(&plate_crop(100, 30))
        .unwrap();

    let recognizer = Arc::new(
        ScriptedRecognizer::with_default(vec![RecognizedSpan::new("29A12345", 0.5)])
            .delay("original", Duration::from_millis(60))
            .delay("grayscale", Duration::from_millis(30)),
    );
    let expected: Vec<_> = variants.iter().map(|v| v.name).collect();

    let candidates = recognize_variants(recognizer.clone(), variants, 4).await;

    let names: Vec<_> = candidates.iter().map(|c| c.source_variant.as_str()).collect();
    assert_eq!(names, expected);
    assert_eq!(recognizer.calls(), expected.len());
}

#[tokio::test]
async fn test_failed_variant_counts_as_empty_read() {
    let variants = VariantGenerator::new(VariantProfile::Compact)
        .generate(&plate_crop(100, 30))
        .unwrap();

    let count = variants.len();
    let recognizer = Arc::new(
        ScriptedRecognizer::with_default(vec![RecognizedSpan::new("29A12345", 0.5)])
            .fail_on("original"),
    );

    let candidates = recognize_variants(recognizer, variants, 2).await;

    assert_eq!(candidates.len(), count);
    assert_eq!(candidates[0].source_variant, "original");
    assert!(candidates[0].text.is_empty());
    assert!(candidates[1..].iter().all(|c| c.text == "29A12345"));
}

#[tokio::test]
async fn test_analyzer_prefers_special_format_variant() {
    let recognizer = ScriptedRecognizer::with_default(vec![RecognizedSpan::new("68G16686", 0.9)])
        .script("otsu", vec![RecognizedSpan::new("68-G1", 0.6), RecognizedSpan::new("668.86", 0.5)]);
    let analyzer = PlateAnalyzer::new(Arc::new(recognizer));

    let analysis = analyzer.analyze_crop(&plate_crop(120, 40), 0.88).await.unwrap();

    assert_eq!(analysis.plate_number, "68-G1 668.86");
    assert_eq!(analysis.source_variant.as_deref(), Some("otsu"));
    assert!((analysis.confidence_ocr - 0.55).abs() < 1e-6);

    let record = analysis.plate_analysis.unwrap();
    assert!(record.is_valid);
    assert_eq!(record.province_code, "68");
    assert_eq!(record.serial, "G1");
    assert_eq!(record.number, "668.86");
    assert_eq!(record.vehicle_type, Some(VehicleType::Motorbike));
}

#[tokio::test]
async fn test_analyzer_result_does_not_depend_on_concurrency() {
    let recognizer = Arc::new(
        ScriptedRecognizer::with_default(vec![RecognizedSpan::new("51A12345", 0.7)])
            .script("sharpen", vec![RecognizedSpan::new("51A12346", 0.7)])
            .delay("original", Duration::from_millis(20)),
    );

    let serial = PlateAnalyzer::new(recognizer.clone()).with_concurrency(1);
    let parallel = PlateAnalyzer::new(recognizer).with_concurrency(8);

    let crop = plate_crop(120, 40);
    let a = serial.analyze_crop(&crop, 0.9).await.unwrap();
    let b = parallel.analyze_crop(&crop, 0.9).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(a.plate_number, "51A12345");
    assert_eq!(a.source_variant.as_deref(), Some("original"));
}

#[tokio::test]
async fn test_analyzer_keeps_unparseable_text() {
    let recognizer = ScriptedRecognizer::with_default(vec![RecognizedSpan::new("??###", 0.4)]);
    let analyzer = PlateAnalyzer::new(Arc::new(recognizer));

    let analysis = analyzer.analyze_crop(&yellow_crop(), 0.7).await.unwrap();

    assert_eq!(analysis.plate_number, "??###");
    assert_eq!(analysis.color_estimate.color, PlateColor::Yellow);

    let record = analysis.plate_analysis.unwrap();
    assert!(!record.is_valid);
    assert_eq!(record.detected_color, Some(PlateColor::Yellow));
}

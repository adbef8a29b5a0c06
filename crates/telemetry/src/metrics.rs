use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Request Metrics ====
    pub static ref LPR_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("lpr_requests_total", "Total number of processed images"),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_REQUEST_DURATION: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_request_duration_seconds",
                "End-to-end duration of image processing",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_PLATES_DETECTED: IntCounter = {
        let metric = IntCounter::new("lpr_plates_detected_total", "Total number of plates located")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Pipeline Metrics ====
    pub static ref LPR_VARIANTS_GENERATED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_variants_generated_total",
                "Image variants produced per transform",
            ),
            &["variant"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_RECOGNITION_DURATION: Histogram = {
        let metric = Histogram::with_opts(HistogramOpts::new(
            "lpr_recognition_duration_seconds",
            "Duration of the recognition fan-out for one crop",
        ))
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_PARSE_OUTCOMES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("lpr_parse_outcomes_total", "Plate strings parsed by matched grammar"),
            &["format", "valid"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Model Metrics ====
    pub static ref LPR_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new("lpr_inference_time_seconds", "Model inference time")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["model", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_MODELS_LOADED: IntGauge = {
        let metric = IntGauge::new("lpr_models_loaded", "Number of loaded inference sessions")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

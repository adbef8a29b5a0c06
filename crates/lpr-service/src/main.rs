use anyhow::{Context, Result};
use lpr_service::{
    api,
    config::{EngineKind, ServiceConfig},
    engine::{
        mock::{MockPlateDetector, ScriptedRecognizer},
        onnx::{OnnxPlateDetector, OnnxTextRecognizer},
        PlateDetector, TextRecognizer,
    },
    pipeline, LprPipeline, LprServiceState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so the file appender flushes on exit
    let _log_guard = telemetry::init_with_service("lpr-service");

    info!("Starting LPR service...");

    // Load configuration from environment
    let config = ServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        node_id = %config.node_id,
        engine = ?config.engine,
        profile = ?config.pipeline.variant_profile,
        provinces = pipeline::provinces::known_codes(),
        "LPR service configuration"
    );

    let (detector, recognizer) = build_engines(&config)?;
    let pipeline = LprPipeline::new(detector, recognizer, config.pipeline.clone());
    let state = LprServiceState::new(config.node_id.clone(), pipeline, config.max_upload_bytes);

    // Build HTTP router
    let app = api::router(state).layer(api::cors_layer(&config.allowed_origin)?);

    // Bind and serve
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("LPR service listening on {}", config.bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("LPR service stopped");
    Ok(())
}

fn build_engines(
    config: &ServiceConfig,
) -> Result<(Arc<dyn PlateDetector>, Arc<dyn TextRecognizer>)> {
    match config.engine {
        EngineKind::Onnx => {
            let detector = OnnxPlateDetector::load(config.onnx.clone())
                .context("Failed to load plate detector")?;
            let recognizer = OnnxTextRecognizer::load(config.onnx.clone())
                .context("Failed to load text recognizer")?;
            Ok((Arc::new(detector), Arc::new(recognizer)))
        }
        EngineKind::Mock => {
            warn!("Running with mock engines: every image is one plate and nothing is read");
            Ok((
                Arc::new(MockPlateDetector::whole_image()),
                Arc::new(ScriptedRecognizer::silent()),
            ))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}

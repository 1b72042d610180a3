//! QR Scanner - Desktop QR code scanner
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint GUI frontend. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio runtime (blocking pool for QR decoding)
//! - Configuration and history loading ([`ConfigManager`], [`StateManager`])
//! - The scan orchestrator and camera backend
//! - GUI controller ([`GuiController`] - bridges Slint UI with the scanner)
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop and owns all UI state
//! - **Tokio workers**: Decode frames via `spawn_blocking`
//! - **Camera preview thread**: Streams frames while the camera runs
//!
//! # Execution Flow
//!
//! 1. Resolve the data directory ($QR_SCANNER_DATA_DIR or the platform data dir)
//! 2. Initialize logging → <data dir>/logs/qr-scanner.<date>
//! 3. Create tokio runtime
//! 4. Load settings.json and history.txt
//! 5. Create GuiController and scan an image given on the command line
//! 6. Run Slint event loop (blocks until window closed)
//! 7. Shutdown tokio runtime with a timeout and log metrics

use anyhow::{Context, Result};
use qr_scanner::services::camera;
use qr_scanner::services::files::image_from_args;
use qr_scanner::ui::GuiController;
use qr_scanner::{
    APP_NAME, ConfigManager, DecodePipeline, Metrics, ScanOrchestrator, StateManager, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

const WORKER_THREADS: usize = 2;

fn main() -> Result<()> {
    let data_dir = ConfigManager::default_data_dir();

    // Held for the whole run; dropping it flushes the log file
    let _log_guard = qr_scanner::logging::setup_logging_with_console(
        &data_dir.join("logs"),
        APP_NAME,
        qr_scanner::logging::debug_from_env(),
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("qr-scanner-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let config_manager = ConfigManager::new(&data_dir)?;
    tracing::info!("Data directory: {}", config_manager.data_dir());

    let state_manager = StateManager::new(config_manager);
    let metrics = Arc::new(Metrics::new());

    let (orchestrator, channels) = ScanOrchestrator::new(
        DecodePipeline::default(),
        camera::default_backend(),
        runtime.handle().clone(),
        Arc::clone(&metrics),
    );

    let gui_controller =
        GuiController::new(state_manager, orchestrator, channels, Arc::clone(&metrics))?;

    if let Some(path) = image_from_args(std::env::args_os().skip(1)) {
        tracing::info!("Scanning startup image {}", path.display());
        gui_controller.open_path(&path);
    }

    tracing::info!("GUI controller initialized, launching window");

    // Run the GUI (blocks until window is closed)
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    // In-flight decodes are abandoned after the timeout
    runtime.shutdown_timeout(Duration::from_secs(5));

    metrics.log_summary();
    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}

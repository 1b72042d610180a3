use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that switches logging to debug level when set to `1`.
pub const DEBUG_ENV: &str = "QR_SCANNER_DEBUG";

/// Whether [`DEBUG_ENV`] asks for debug logging.
pub fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV).is_ok_and(|value| debug_flag(&value))
}

fn debug_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "yes")
}

fn env_filter(debug_mode: bool) -> EnvFilter {
    if debug_mode {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

fn create_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Setup logging with rotating file appender.
///
/// Logs are written to `log_dir` with daily rotation.
///
/// # Arguments
/// * `log_dir` - Directory for log files (e.g., "<data dir>/logs")
/// * `log_prefix` - Prefix for log files (e.g., "qr-scanner")
/// * `debug_mode` - If true, use debug level; otherwise use info level
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(log_dir: &Utf8Path, log_prefix: &str, debug_mode: bool) -> Result<WorkerGuard> {
    setup_logging_with_console(log_dir, log_prefix, debug_mode, false)
}

/// Setup logging with optional console output for debugging.
///
/// # Arguments
/// * `log_dir` - Directory for log files
/// * `log_prefix` - Prefix for log files
/// * `debug_mode` - If true, use debug level; otherwise use info level
/// * `console_output` - If true, also log to console
///
/// # Errors
///
/// Fails if the directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging_with_console(
    log_dir: &Utf8Path,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    create_log_dir(log_dir)?;

    // Create daily rotating file appender
    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Also log to console with ANSI colors for better readability
    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir,
        log_prefix,
        debug_mode,
        console_output
    );

    Ok(guard)
}

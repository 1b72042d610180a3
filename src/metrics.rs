// Performance metrics module
//
// Provides lightweight metrics tracking for monitoring scan throughput

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Scanner metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks, so
/// the UI thread, decode tasks and the camera preview thread can all record
/// into the same instance. A summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Scans dispatched (file, drop or camera capture)
    pub scans_started: AtomicU64,

    /// Scans that decoded a payload
    pub scans_succeeded: AtomicU64,

    /// Scans that completed but found no QR code
    pub scans_no_code: AtomicU64,

    /// Scans that ended with an error
    pub scans_failed: AtomicU64,

    /// Total time spent decoding in milliseconds
    pub total_decode_time_ms: AtomicU64,

    /// Camera preview frames delivered to the UI queue
    pub camera_frames: AtomicU64,

    /// Camera preview frames dropped because the UI queue was full
    pub previews_dropped: AtomicU64,

    /// Scan events applied on the UI thread
    pub ui_events: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            scans_started: AtomicU64::new(0),
            scans_succeeded: AtomicU64::new(0),
            scans_no_code: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            total_decode_time_ms: AtomicU64::new(0),
            camera_frames: AtomicU64::new(0),
            previews_dropped: AtomicU64::new(0),
            ui_events: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_scan_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_succeeded(&self) {
        self.scans_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_no_code(&self) {
        self.scans_no_code.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent in one decode
    pub fn record_decode_time(&self, duration: Duration) {
        self.total_decode_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_camera_frame(&self) {
        self.camera_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preview_dropped(&self) {
        self.previews_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_event(&self) {
        self.ui_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Scans that reached a final outcome
    pub fn scans_completed(&self) -> u64 {
        self.scans_succeeded.load(Ordering::Relaxed)
            + self.scans_no_code.load(Ordering::Relaxed)
            + self.scans_failed.load(Ordering::Relaxed)
    }

    /// Get average decode time per completed scan in milliseconds
    pub fn avg_decode_time_ms(&self) -> f64 {
        let total = self.total_decode_time_ms.load(Ordering::Relaxed);
        let count = self.scans_completed();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Scanner Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Scans: {} started, {} decoded, {} without code, {} failed",
            self.scans_started.load(Ordering::Relaxed),
            self.scans_succeeded.load(Ordering::Relaxed),
            self.scans_no_code.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total decode time: {:.2}s (avg: {:.2}ms per scan)",
            self.total_decode_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_decode_time_ms()
        );
        tracing::info!(
            "Camera frames: {} previewed, {} dropped; UI events: {}",
            self.camera_frames.load(Ordering::Relaxed),
            self.previews_dropped.load(Ordering::Relaxed),
            self.ui_events.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

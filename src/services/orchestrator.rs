// Scan orchestration
//
// Turns user intents (open a file, drop a file, capture from the camera,
// start/stop the camera) into background decode work and a stream of
// ScanEvents for the UI thread.
//
// Threading model:
// - Public methods are called from the UI thread only
// - Decoding runs on tokio's blocking pool via spawn_blocking
// - The live camera preview runs on a dedicated std thread that stops when
//   the session's CancellationToken fires
// - Everything flows back to the UI through channels; no state is shared

use crate::metrics::Metrics;
use crate::models::{ScanProgress, ScanResult};
use crate::services::ScanError;
use crate::services::camera::{CameraBackend, CameraFrameSource};
use crate::services::decode::DecodePipeline;
use crate::services::frame_source::{
    CAMERA_PREVIEW_SIZE, FILE_PREVIEW_SIZE, FrameSource, StaticFrameSource, preview_of,
};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Live previews waiting for the UI; older frames are dropped when full.
pub const PREVIEW_CHANNEL_CAPACITY: usize = 2;

/// Consecutive read failures tolerated before the camera is given up on.
const MAX_CONSECUTIVE_CAMERA_ERRORS: u32 = 30;

/// Pause between failed camera reads.
const CAMERA_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Messages from the orchestrator to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A scan advanced to `stage`
    Progress { scan_id: u64, stage: ScanProgress },

    /// Downscaled image of what is being scanned
    Preview { scan_id: u64, image: RgbaImage },

    /// Final outcome; always sent after `DecodeComplete`
    Finished {
        scan_id: u64,
        outcome: Result<ScanResult, ScanError>,
    },

    /// The live camera stopped producing frames
    CameraFailed { message: String },
}

impl ScanEvent {
    /// Scan this event belongs to, if any.
    pub fn scan_id(&self) -> Option<u64> {
        match self {
            ScanEvent::Progress { scan_id, .. }
            | ScanEvent::Preview { scan_id, .. }
            | ScanEvent::Finished { scan_id, .. } => Some(*scan_id),
            ScanEvent::CameraFailed { .. } => None,
        }
    }
}

/// Receiving ends handed to the UI layer.
#[derive(Debug)]
pub struct ScanChannels {
    pub events: mpsc::UnboundedReceiver<ScanEvent>,
    pub camera_previews: mpsc::Receiver<RgbaImage>,
}

/// Emits progress stages in order, each exactly once.
///
/// Whatever happens to the scan, every remaining stage is emitted by the
/// time the guard is completed or dropped.
struct ProgressGuard {
    scan_id: u64,
    next: Option<ScanProgress>,
    events: mpsc::UnboundedSender<ScanEvent>,
}

impl ProgressGuard {
    fn start(scan_id: u64, events: mpsc::UnboundedSender<ScanEvent>) -> Self {
        let mut guard = Self {
            scan_id,
            next: Some(ScanProgress::Started),
            events,
        };
        guard.advance_to(ScanProgress::Started);
        guard
    }

    fn advance_to(&mut self, stage: ScanProgress) {
        while let Some(next) = self.next {
            if next > stage {
                break;
            }
            let _ = self.events.send(ScanEvent::Progress {
                scan_id: self.scan_id,
                stage: next,
            });
            self.next = next.next();
        }
    }

    fn complete(mut self) {
        self.advance_to(ScanProgress::DecodeComplete);
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.advance_to(ScanProgress::DecodeComplete);
    }
}

/// Running camera: the shared source and its preview thread.
struct CameraSession {
    source: CameraFrameSource,
    preview_thread: Option<ThreadHandle<()>>,
}

/// Coordinates frame sources, decoding and progress reporting.
pub struct ScanOrchestrator {
    pipeline: DecodePipeline,
    runtime: tokio::runtime::Handle,
    camera_backend: Arc<dyn CameraBackend>,
    camera: Option<CameraSession>,
    events: mpsc::UnboundedSender<ScanEvent>,
    camera_previews: mpsc::Sender<RgbaImage>,
    metrics: Arc<Metrics>,
    next_scan_id: u64,
}

impl ScanOrchestrator {
    /// Create an orchestrator and the channels its events arrive on.
    pub fn new(
        pipeline: DecodePipeline,
        camera_backend: Arc<dyn CameraBackend>,
        runtime: tokio::runtime::Handle,
        metrics: Arc<Metrics>,
    ) -> (Self, ScanChannels) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (previews_tx, previews_rx) = mpsc::channel(PREVIEW_CHANNEL_CAPACITY);

        let orchestrator = Self {
            pipeline,
            runtime,
            camera_backend,
            camera: None,
            events: events_tx,
            camera_previews: previews_tx,
            metrics,
            next_scan_id: 0,
        };

        let channels = ScanChannels {
            events: events_rx,
            camera_previews: previews_rx,
        };

        (orchestrator, channels)
    }

    /// Scan an image file.
    ///
    /// The file is loaded and its preview published before this returns;
    /// decoding happens in the background. A load failure is reported both
    /// as the return value and as a `Finished` event, after all progress
    /// stages.
    pub fn scan_from_file(&mut self, path: &Path) -> Result<JoinHandle<()>, ScanError> {
        let scan_id = self.begin_scan();
        let progress = ProgressGuard::start(scan_id, self.events.clone());
        tracing::info!(scan_id, "Scanning file {}", path.display());

        let source = match StaticFrameSource::open(path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(scan_id, "Failed to load {}: {}", path.display(), e);
                self.finish_early(scan_id, progress, e.clone());
                return Err(e);
            }
        };

        if let Some(frame) = source.peek() {
            self.send(ScanEvent::Preview {
                scan_id,
                image: preview_of(frame, FILE_PREVIEW_SIZE),
            });
        }

        Ok(self.dispatch(scan_id, progress, Box::new(source), None))
    }

    /// Scan one frame grabbed from the running camera.
    ///
    /// # Errors
    ///
    /// [`ScanError::CameraInactive`] when no camera is running; no scan is
    /// started in that case.
    pub fn scan_from_camera_capture(&mut self) -> Result<JoinHandle<()>, ScanError> {
        let source = match &self.camera {
            Some(session) if session.source.is_active() => session.source.clone(),
            _ => return Err(ScanError::CameraInactive),
        };

        let scan_id = self.begin_scan();
        let progress = ProgressGuard::start(scan_id, self.events.clone());
        tracing::info!(scan_id, "Scanning frame from camera {}", source.device_index());

        Ok(self.dispatch(scan_id, progress, Box::new(source), Some(FILE_PREVIEW_SIZE)))
    }

    /// Open camera `device_index` and start streaming previews.
    ///
    /// Does nothing if a camera is already running.
    pub fn start_camera(&mut self, device_index: u32) -> Result<(), ScanError> {
        if self.camera_active() {
            tracing::debug!("Camera already running");
            return Ok(());
        }
        // Drop a session left behind by a failed preview loop
        self.stop_camera();

        let source = CameraFrameSource::open(self.camera_backend.as_ref(), device_index)?;

        let loop_source = source.clone();
        let previews = self.camera_previews.clone();
        let events = self.events.clone();
        let metrics = Arc::clone(&self.metrics);
        let preview_thread = std::thread::Builder::new()
            .name("camera-preview".to_string())
            .spawn(move || run_preview_loop(loop_source, previews, events, metrics))
            .map_err(|e| {
                source.close();
                ScanError::Task(format!("Failed to start camera preview: {}", e))
            })?;

        tracing::info!("Camera {} started", device_index);
        self.camera = Some(CameraSession {
            source,
            preview_thread: Some(preview_thread),
        });
        Ok(())
    }

    /// Stop the camera and release the device.
    ///
    /// The device is released before this returns. Calling it with no
    /// camera running is a no-op.
    pub fn stop_camera(&mut self) {
        let Some(mut session) = self.camera.take() else {
            return;
        };

        session.source.close();
        if let Some(handle) = session.preview_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Camera preview thread panicked");
            }
        }
        tracing::info!("Camera {} stopped", session.source.device_index());
    }

    /// Start the camera if stopped, stop it if running.
    ///
    /// Returns whether the camera is running afterwards.
    pub fn toggle_camera(&mut self, device_index: u32) -> Result<bool, ScanError> {
        if self.camera_active() {
            self.stop_camera();
            Ok(false)
        } else {
            self.start_camera(device_index)?;
            Ok(true)
        }
    }

    pub fn camera_active(&self) -> bool {
        self.camera
            .as_ref()
            .is_some_and(|session| session.source.is_active())
    }

    /// Release everything; used when the window closes.
    pub fn shutdown(&mut self) {
        self.stop_camera();
    }

    fn begin_scan(&mut self) -> u64 {
        self.next_scan_id += 1;
        self.metrics.record_scan_started();
        self.next_scan_id
    }

    fn send(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Scan event receiver dropped");
        }
    }

    fn finish_early(&self, scan_id: u64, progress: ProgressGuard, error: ScanError) {
        progress.complete();
        self.metrics.record_scan_failed();
        self.send(ScanEvent::Finished {
            scan_id,
            outcome: Err(error),
        });
    }

    /// Decode the next frame of `source` in the background.
    ///
    /// With `preview_bounds`, a preview of the frame is published before
    /// decoding.
    fn dispatch(
        &self,
        scan_id: u64,
        mut progress: ProgressGuard,
        mut source: Box<dyn FrameSource>,
        preview_bounds: Option<(u32, u32)>,
    ) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let metrics = Arc::clone(&self.metrics);

        self.runtime.spawn(async move {
            progress.advance_to(ScanProgress::DecodeInFlight);

            let started = Instant::now();
            let preview_events = events.clone();
            let outcome = tokio::task::spawn_blocking(move || -> Result<ScanResult, ScanError> {
                let frame = source.produce_frame()?.ok_or(ScanError::CameraInactive)?;
                if let Some(bounds) = preview_bounds {
                    let _ = preview_events.send(ScanEvent::Preview {
                        scan_id,
                        image: preview_of(&frame, bounds),
                    });
                }
                pipeline.decode(&frame)
            })
            .await
            .unwrap_or_else(|e| Err(ScanError::Task(e.to_string())));

            metrics.record_decode_time(started.elapsed());
            match &outcome {
                Ok(result) if result.found => metrics.record_scan_succeeded(),
                Ok(_) => metrics.record_scan_no_code(),
                Err(e) => {
                    tracing::warn!(scan_id, "Scan failed: {}", e);
                    metrics.record_scan_failed();
                }
            }

            progress.complete();
            let _ = events.send(ScanEvent::Finished { scan_id, outcome });
        })
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.stop_camera();
    }
}

/// Push camera frames to the UI until the session is cancelled.
fn run_preview_loop(
    mut source: CameraFrameSource,
    previews: mpsc::Sender<RgbaImage>,
    events: mpsc::UnboundedSender<ScanEvent>,
    metrics: Arc<Metrics>,
) {
    let cancel = source.cancellation();
    let mut consecutive_errors = 0;
    tracing::debug!("Camera preview loop started");

    while !cancel.is_cancelled() {
        match source.produce_frame() {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                match previews.try_send(preview_of(&frame, CAMERA_PREVIEW_SIZE)) {
                    Ok(()) => metrics.record_camera_frame(),
                    Err(mpsc::error::TrySendError::Full(_)) => metrics.record_preview_dropped(),
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Ok(None) => break,
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(
                    "Camera read failed ({}/{}): {}",
                    consecutive_errors,
                    MAX_CONSECUTIVE_CAMERA_ERRORS,
                    e
                );
                if consecutive_errors >= MAX_CONSECUTIVE_CAMERA_ERRORS {
                    source.close();
                    let _ = events.send(ScanEvent::CameraFailed {
                        message: e.to_string(),
                    });
                    break;
                }
                std::thread::sleep(CAMERA_RETRY_DELAY);
            }
        }
    }

    tracing::debug!("Camera preview loop stopped");
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("camera_active", &self.camera_active())
            .field("next_scan_id", &self.next_scan_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::camera::{CaptureDevice, NoCameraBackend};
    use crate::services::decode::MockQrDecoder;
    use crate::services::frame_source::Frame;
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn gray_frame() -> Frame {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([255])))
    }

    fn decoder_returning(payload: Option<&'static str>) -> DecodePipeline {
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode_candidates().returning(move |_| {
            Ok(payload.map(|p| p.as_bytes().to_vec()).into_iter().collect())
        });
        DecodePipeline::new(Arc::new(decoder))
    }

    fn orchestrator(
        pipeline: DecodePipeline,
        backend: Arc<dyn CameraBackend>,
    ) -> (ScanOrchestrator, ScanChannels) {
        ScanOrchestrator::new(
            pipeline,
            backend,
            tokio::runtime::Handle::current(),
            Arc::new(Metrics::new()),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn stages(events: &[ScanEvent]) -> Vec<ScanProgress> {
        events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Progress { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    struct StillDevice;

    impl CaptureDevice for StillDevice {
        fn read_frame(&mut self) -> Result<Frame, ScanError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(gray_frame())
        }
    }

    struct BrokenDevice;

    impl CaptureDevice for BrokenDevice {
        fn read_frame(&mut self) -> Result<Frame, ScanError> {
            Err(ScanError::Capture("unplugged".to_string()))
        }
    }

    struct FixedBackend {
        broken: bool,
        opened: AtomicBool,
    }

    impl FixedBackend {
        fn new(broken: bool) -> Arc<Self> {
            Arc::new(Self {
                broken,
                opened: AtomicBool::new(false),
            })
        }
    }

    impl CameraBackend for FixedBackend {
        fn open(&self, _index: u32) -> Result<Box<dyn CaptureDevice>, ScanError> {
            self.opened.store(true, Ordering::SeqCst);
            if self.broken {
                Ok(Box::new(BrokenDevice))
            } else {
                Ok(Box::new(StillDevice))
            }
        }
    }

    #[test]
    fn test_progress_guard_emits_each_stage_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut guard = ProgressGuard::start(7, tx);
        guard.advance_to(ScanProgress::DecodeInFlight);
        guard.advance_to(ScanProgress::DecodeInFlight);
        guard.complete();

        let events = drain(&mut rx);
        assert_eq!(stages(&events), ScanProgress::ALL.to_vec());
        assert!(events.iter().all(|e| e.scan_id() == Some(7)));
    }

    #[test]
    fn test_progress_guard_completes_on_drop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(ProgressGuard::start(1, tx));

        assert_eq!(stages(&drain(&mut rx)), ScanProgress::ALL.to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_from_file_event_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("code.png");
        gray_frame().save(&path).unwrap();

        let (mut orch, mut channels) =
            orchestrator(decoder_returning(Some("HELLO")), Arc::new(NoCameraBackend));
        orch.scan_from_file(&path).unwrap().await.unwrap();

        let events = drain(&mut channels.events);
        assert!(matches!(events[0], ScanEvent::Progress { stage: ScanProgress::Started, .. }));
        assert!(matches!(events[1], ScanEvent::Preview { .. }));
        assert_eq!(stages(&events), ScanProgress::ALL.to_vec());
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Finished {
                scan_id: 1,
                outcome: Ok(ScanResult::found("HELLO")),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_from_missing_file_reports_error_after_progress() {
        let (mut orch, mut channels) =
            orchestrator(decoder_returning(None), Arc::new(NoCameraBackend));

        let err = orch
            .scan_from_file(Path::new("/definitely/missing.png"))
            .unwrap_err();
        assert!(matches!(err, ScanError::ImageLoad(_)));

        let events = drain(&mut channels.events);
        assert_eq!(stages(&events), ScanProgress::ALL.to_vec());
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Finished { outcome: Err(ScanError::ImageLoad(_)), .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_ids_increase() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("code.png");
        gray_frame().save(&path).unwrap();

        let (mut orch, mut channels) =
            orchestrator(decoder_returning(None), Arc::new(NoCameraBackend));
        orch.scan_from_file(&path).unwrap().await.unwrap();
        orch.scan_from_file(&path).unwrap().await.unwrap();

        let finished: Vec<u64> = drain(&mut channels.events)
            .iter()
            .filter(|e| matches!(e, ScanEvent::Finished { .. }))
            .filter_map(ScanEvent::scan_id)
            .collect();
        assert_eq!(finished, vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_capture_without_camera() {
        let (mut orch, mut channels) =
            orchestrator(decoder_returning(None), Arc::new(NoCameraBackend));

        let err = orch.scan_from_camera_capture().err().unwrap();
        assert_eq!(err, ScanError::CameraInactive);
        assert!(drain(&mut channels.events).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_camera_unavailable() {
        let (mut orch, _channels) =
            orchestrator(decoder_returning(None), Arc::new(NoCameraBackend));

        let err = orch.start_camera(0).unwrap_err();
        assert!(matches!(err, ScanError::DeviceUnavailable { index: 0, .. }));
        assert!(!orch.camera_active());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_camera_previews_and_capture() {
        let backend = FixedBackend::new(false);
        let (mut orch, mut channels) =
            orchestrator(decoder_returning(Some("CAM")), backend.clone());

        orch.start_camera(0).unwrap();
        assert!(orch.camera_active());
        assert!(backend.opened.load(Ordering::SeqCst));

        let preview = channels.camera_previews.recv().await.unwrap();
        assert_eq!((preview.width(), preview.height()), (32, 32));

        orch.scan_from_camera_capture().unwrap().await.unwrap();
        let events = drain(&mut channels.events);
        assert!(events.iter().any(|e| matches!(e, ScanEvent::Preview { .. })));
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Finished {
                scan_id: 1,
                outcome: Ok(ScanResult::found("CAM")),
            })
        );

        orch.stop_camera();
        assert!(!orch.camera_active());
        // Stopping twice is harmless
        orch.stop_camera();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_toggle_camera() {
        let (mut orch, _channels) =
            orchestrator(decoder_returning(None), FixedBackend::new(false));

        assert!(orch.toggle_camera(0).unwrap());
        assert!(orch.camera_active());
        assert!(!orch.toggle_camera(0).unwrap());
        assert!(!orch.camera_active());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broken_camera_reports_failure() {
        let (mut orch, mut channels) =
            orchestrator(decoder_returning(None), FixedBackend::new(true));

        orch.start_camera(3).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), channels.events.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(event, ScanEvent::CameraFailed { .. }));
        assert!(!orch.camera_active());
        orch.shutdown();
    }
}

//! Live camera frame source.
//!
//! The hardware sits behind [`CameraBackend`] / [`CaptureDevice`] so the rest
//! of the scanner never sees a concrete camera API. With the `camera` feature
//! the default backend is nokhwa; without it every device reports as
//! unavailable.
//!
//! Session state machine:
//!
//! ```text
//! Closed --open ok--> Streaming --close--> Closed
//! Closed --open fails--> Closed (error returned to the caller)
//! ```

use crate::services::frame_source::{Frame, FrameSource};
use crate::services::ScanError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// An opened capture device.
///
/// Dropping the device releases the hardware handle.
pub trait CaptureDevice: Send {
    /// Block until the device yields its next frame or fails.
    fn read_frame(&mut self) -> Result<Frame, ScanError>;
}

/// Opens capture devices by index.
pub trait CameraBackend: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, ScanError>;
}

/// Backend used when the binary was built without camera support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCameraBackend;

impl CameraBackend for NoCameraBackend {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, ScanError> {
        Err(ScanError::DeviceUnavailable {
            index,
            reason: "camera support is not compiled in".to_string(),
        })
    }
}

/// The platform camera backend for this build.
pub fn default_backend() -> Arc<dyn CameraBackend> {
    #[cfg(feature = "camera")]
    {
        Arc::new(native::NokhwaBackend)
    }

    #[cfg(not(feature = "camera"))]
    {
        Arc::new(NoCameraBackend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Closed,
    Streaming,
}

/// Frame source backed by an open capture device.
///
/// Clones share the same device and cancellation token, so the preview loop
/// and an explicit capture can both pull frames; reads are serialized by the
/// device mutex.
#[derive(Clone)]
pub struct CameraFrameSource {
    device_index: u32,
    device: Arc<Mutex<Option<Box<dyn CaptureDevice>>>>,
    cancel: CancellationToken,
}

impl CameraFrameSource {
    /// Open device `index`.
    ///
    /// The source only exists once the device opened successfully, so a
    /// failed open can never leave a half-active session behind.
    pub fn open(backend: &dyn CameraBackend, index: u32) -> Result<Self, ScanError> {
        let device = backend.open(index)?;
        tracing::info!("Camera {} opened", index);

        Ok(Self {
            device_index: index,
            device: Arc::new(Mutex::new(Some(device))),
            cancel: CancellationToken::new(),
        })
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn state(&self) -> CameraState {
        if !self.cancel.is_cancelled() && self.lock_device().is_some() {
            CameraState::Streaming
        } else {
            CameraState::Closed
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == CameraState::Streaming
    }

    /// Token cancelled when the session closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the session and release the device.
    ///
    /// The token is cancelled first so a running preview loop exits at its
    /// next iteration; the handle is then dropped on the calling thread,
    /// waiting for a read that is already in progress. Closing a closed
    /// source is a no-op.
    pub fn close(&self) {
        self.cancel.cancel();
        let released = self.lock_device().take();
        if released.is_some() {
            drop(released);
            tracing::info!("Camera {} released", self.device_index);
        }
    }

    fn lock_device(&self) -> MutexGuard<'_, Option<Box<dyn CaptureDevice>>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSource for CameraFrameSource {
    fn produce_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let mut device = self.lock_device();
        match device.as_mut() {
            Some(device) => device.read_frame().map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for CameraFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrameSource")
            .field("device_index", &self.device_index)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(feature = "camera")]
mod native {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};

    type FrameReply = mpsc::SyncSender<Result<Frame, ScanError>>;

    /// nokhwa-backed camera access.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct NokhwaBackend;

    impl CameraBackend for NokhwaBackend {
        fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, ScanError> {
            let device = NokhwaDevice::open(index)?;
            Ok(Box::new(device))
        }
    }

    /// nokhwa cameras are not `Send` on every platform, so each camera lives
    /// on its own thread and frames are requested over a channel.
    struct NokhwaDevice {
        index: u32,
        requests: Option<mpsc::Sender<FrameReply>>,
        worker: Option<JoinHandle<()>>,
    }

    impl NokhwaDevice {
        fn open(index: u32) -> Result<Self, ScanError> {
            let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), ScanError>>(1);
            let (request_tx, request_rx) = mpsc::channel::<FrameReply>();

            let worker = thread::Builder::new()
                .name("camera-device".to_string())
                .spawn(move || run_device(index, ready_tx, request_rx))
                .map_err(|e| ScanError::DeviceUnavailable {
                    index,
                    reason: e.to_string(),
                })?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self {
                    index,
                    requests: Some(request_tx),
                    worker: Some(worker),
                }),
                Ok(Err(e)) => {
                    let _ = worker.join();
                    Err(e)
                }
                Err(_) => {
                    let _ = worker.join();
                    Err(ScanError::DeviceUnavailable {
                        index,
                        reason: "camera thread exited during startup".to_string(),
                    })
                }
            }
        }
    }

    impl CaptureDevice for NokhwaDevice {
        fn read_frame(&mut self) -> Result<Frame, ScanError> {
            let requests = self.requests.as_ref().ok_or(ScanError::CameraInactive)?;
            let stopped = || ScanError::Capture(format!("camera {} thread stopped", self.index));

            let (reply_tx, reply_rx) = mpsc::sync_channel(1);
            requests.send(reply_tx).map_err(|_| stopped())?;
            reply_rx.recv().map_err(|_| stopped())?
        }
    }

    impl Drop for NokhwaDevice {
        fn drop(&mut self) {
            // Closing the request channel ends the worker loop
            self.requests.take();
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    fn run_device(
        index: u32,
        ready: mpsc::SyncSender<Result<(), ScanError>>,
        requests: mpsc::Receiver<FrameReply>,
    ) {
        let unavailable = |reason: String| ScanError::DeviceUnavailable { index, reason };

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready.send(Err(unavailable(e.to_string())));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            let _ = ready.send(Err(unavailable(e.to_string())));
            return;
        }

        tracing::info!(
            "Camera stream opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );
        let _ = ready.send(Ok(()));

        while let Ok(reply) = requests.recv() {
            let frame = camera
                .frame()
                .map_err(|e| ScanError::Capture(e.to_string()))
                .and_then(|buffer| {
                    let decoded = buffer
                        .decode_image::<RgbFormat>()
                        .map_err(|e| ScanError::Capture(e.to_string()))?;
                    let (width, height) = (decoded.width(), decoded.height());
                    RgbImage::from_raw(width, height, decoded.into_raw())
                        .map(DynamicImage::ImageRgb8)
                        .ok_or_else(|| ScanError::Capture("frame size mismatch".to_string()))
                });

            let _ = reply.send(frame);
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Failed to stop camera {} stream: {}", index, e);
        }
        tracing::debug!("Camera {} worker thread terminated", index);
    }
}

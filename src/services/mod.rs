//! Services module - Scanning logic independent of the UI.
//!
//! Everything here can be driven without a window, which is how the tests
//! exercise it.
//!
//! # Components
//!
//! - [`frame_source`]: The [`FrameSource`] capability plus the single-image
//!   [`StaticFrameSource`] and image loading/preview helpers
//! - [`camera`]: [`CameraFrameSource`], a live source over a
//!   [`CameraBackend`] (nokhwa with the `camera` feature)
//! - [`decode`]: [`DecodePipeline`], frame to at most one UTF-8 payload,
//!   over the [`QrDecoder`] capability (rqrr by default)
//! - [`orchestrator`]: [`ScanOrchestrator`], which turns user intents into
//!   background work and a stream of [`ScanEvent`]s
//! - [`clipboard`]: [`ClipboardService`] for copying payloads
//! - [`files`]: Path helpers for the picker, drag-and-drop and argv
//!
//! # Data flow
//!
//! ```text
//! file / camera -> FrameSource -> DecodePipeline -> ScanEvent -> UI thread
//! ```
//!
//! Decoding never runs on the UI thread; results come back over channels
//! and are applied by the state manager.

pub mod camera;
pub mod clipboard;
pub mod decode;
pub mod error;
pub mod files;
pub mod frame_source;
pub mod orchestrator;

pub use camera::{CameraBackend, CameraFrameSource, CaptureDevice, NoCameraBackend};
pub use clipboard::{ClipboardError, ClipboardService};
pub use decode::{DecodePipeline, QrDecoder, RqrrDecoder};
pub use error::ScanError;
pub use frame_source::{Frame, FrameSource, StaticFrameSource};
pub use orchestrator::{ScanChannels, ScanEvent, ScanOrchestrator};

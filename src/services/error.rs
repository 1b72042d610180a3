use std::str::Utf8Error;
use thiserror::Error;

/// Errors that can occur while acquiring or decoding a frame.
///
/// None of these are fatal: the orchestrator turns every one of them into an
/// error message in the results area.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Error processing image: {0}")]
    ImageLoad(String),

    #[error("Could not open camera {index}: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    #[error("Camera is not active")]
    CameraInactive,

    #[error("Camera capture failed: {0}")]
    Capture(String),

    #[error("Error scanning QR code: {0}")]
    Decode(String),

    #[error("Error scanning QR code: payload is not valid UTF-8 ({0})")]
    InvalidEncoding(#[from] Utf8Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::ImageLoad(err.to_string())
    }
}

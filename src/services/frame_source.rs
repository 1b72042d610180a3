use crate::services::ScanError;
use image::{DynamicImage, ImageReader, RgbaImage};
use std::path::Path;

/// A single decoded 2-D image, from a file or a camera.
pub type Frame = DynamicImage;

/// Bounding box of the preview shown after choosing or dropping a file.
pub const FILE_PREVIEW_SIZE: (u32, u32) = (300, 300);

/// Bounding box of the live camera preview.
pub const CAMERA_PREVIEW_SIZE: (u32, u32) = (400, 300);

/// Anything that can hand out frames one at a time.
pub trait FrameSource: Send {
    /// Produce the next frame.
    ///
    /// `Ok(None)` signals end-of-stream; sources never yield again after it.
    fn produce_frame(&mut self) -> Result<Option<Frame>, ScanError>;
}

/// Load and decode an image file, guessing the format from its contents.
pub fn load_image(path: &Path) -> Result<Frame, ScanError> {
    let describe = |e: &dyn std::fmt::Display| format!("{}: {}", path.display(), e);

    let reader = ImageReader::open(path)
        .map_err(|e| ScanError::ImageLoad(describe(&e)))?
        .with_guessed_format()
        .map_err(|e| ScanError::ImageLoad(describe(&e)))?;

    let frame = reader
        .decode()
        .map_err(|e| ScanError::ImageLoad(describe(&e)))?;

    tracing::debug!(
        "Loaded {} ({}x{})",
        path.display(),
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

/// Downscale `frame` to fit within `bounds`, keeping its aspect ratio.
///
/// Frames that already fit are converted without resampling; previews are
/// never enlarged.
pub fn preview_of(frame: &Frame, bounds: (u32, u32)) -> RgbaImage {
    let (max_w, max_h) = bounds;
    if frame.width() <= max_w && frame.height() <= max_h {
        frame.to_rgba8()
    } else {
        frame.thumbnail(max_w, max_h).to_rgba8()
    }
}

/// Frame source over a single already-decoded image.
///
/// Yields the image exactly once, then reports end-of-stream.
#[derive(Debug)]
pub struct StaticFrameSource {
    frame: Option<Frame>,
}

impl StaticFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }

    /// Load the image at `path` into a new source.
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        load_image(path).map(Self::new)
    }

    /// Look at the frame without consuming it.
    pub fn peek(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

impl FrameSource for StaticFrameSource {
    fn produce_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        Ok(self.frame.take())
    }
}

//! Helpers for paths arriving from the file picker, drag-and-drop and the command line.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extensions offered by the "Image files" filter of the file picker.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Whether `path` has one of the [`SUPPORTED_IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Normalize a dropped path.
///
/// Some platforms deliver paths containing spaces wrapped in braces
/// (`{/tmp/my file.png}`); one surrounding pair is stripped along with
/// surrounding whitespace.
pub fn normalize_dropped_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    PathBuf::from(unwrapped)
}

/// First non-flag argument that names a supported image, if any.
pub fn image_from_args<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .filter(|arg| !arg.to_string_lossy().starts_with('-'))
        .map(PathBuf::from)
        .find(|path| is_supported_image(path))
}

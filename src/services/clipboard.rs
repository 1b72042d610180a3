//! Clipboard access for the "Copy to clipboard" button.

use arboard::Clipboard;
use thiserror::Error;

/// Errors that can occur during clipboard operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("Nothing to copy")]
    Empty,

    #[error("Clipboard unavailable: {0}")]
    Platform(String),
}

/// Something that can receive copied text.
#[cfg_attr(test, mockall::automock)]
pub trait TextSink {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// System clipboard through arboard.
///
/// The handle is opened on first use and kept, since on some platforms
/// the copied text only stays available while the owner is alive.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Option<Clipboard>,
}

impl TextSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let clipboard = match self.handle.take() {
            Some(clipboard) => clipboard,
            None => Clipboard::new().map_err(|e| ClipboardError::Platform(e.to_string()))?,
        };
        let clipboard = self.handle.insert(clipboard);
        clipboard
            .set_text(text.to_owned())
            .map_err(|e| ClipboardError::Platform(e.to_string()))
    }
}

/// Copies decoded payloads to a [`TextSink`].
pub struct ClipboardService<S: TextSink = SystemClipboard> {
    sink: S,
}

impl ClipboardService<SystemClipboard> {
    pub fn new() -> Self {
        Self::with_sink(SystemClipboard::default())
    }
}

impl Default for ClipboardService<SystemClipboard> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TextSink> ClipboardService<S> {
    pub fn with_sink(sink: S) -> Self {
        Self { sink }
    }

    /// Copy `payload` verbatim.
    ///
    /// An empty payload is rejected so the clipboard is never cleared by
    /// accident.
    pub fn copy_text(&mut self, payload: &str) -> Result<(), ClipboardError> {
        if payload.is_empty() {
            return Err(ClipboardError::Empty);
        }
        self.sink.set_text(payload)?;
        tracing::info!("Copied {} characters to clipboard", payload.chars().count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_copy_passes_payload_verbatim() {
        let mut sink = MockTextSink::new();
        sink.expect_set_text()
            .with(eq("  https://example.com/?q=1\n"))
            .times(1)
            .returning(|_| Ok(()));

        let mut service = ClipboardService::with_sink(sink);
        service.copy_text("  https://example.com/?q=1\n").unwrap();
    }

    #[test]
    fn test_copy_empty_payload_rejected() {
        let mut sink = MockTextSink::new();
        sink.expect_set_text().never();

        let mut service = ClipboardService::with_sink(sink);
        assert_eq!(service.copy_text(""), Err(ClipboardError::Empty));
    }

    #[test]
    fn test_copy_platform_error() {
        let mut sink = MockTextSink::new();
        sink.expect_set_text()
            .returning(|_| Err(ClipboardError::Platform("no display".to_string())));

        let mut service = ClipboardService::with_sink(sink);
        let err = service.copy_text("HELLO").unwrap_err();
        assert_eq!(err.to_string(), "Clipboard unavailable: no display");
    }
}

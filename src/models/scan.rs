/// Outcome of decoding one frame.
///
/// At most one payload is kept per frame: when several codes are visible only
/// the decoder's first is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub found: bool,
    pub payload: Option<String>,
}

impl ScanResult {
    pub fn found(payload: impl Into<String>) -> Self {
        Self {
            found: true,
            payload: Some(payload.into()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            payload: None,
        }
    }

    /// Text for the results area.
    pub fn display_text(&self) -> String {
        match &self.payload {
            Some(payload) => format!("Decoded QR content:\n{}", payload),
            None => "No QR code found in the image.".to_string(),
        }
    }
}

/// The three progress signals every scan publishes, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanProgress {
    Started,
    DecodeInFlight,
    DecodeComplete,
}

impl ScanProgress {
    pub const ALL: [ScanProgress; 3] = [
        ScanProgress::Started,
        ScanProgress::DecodeInFlight,
        ScanProgress::DecodeComplete,
    ];

    /// Fraction shown by the progress indicator.
    pub fn fraction(self) -> f32 {
        match self {
            ScanProgress::Started => 0.0,
            ScanProgress::DecodeInFlight => 0.3,
            ScanProgress::DecodeComplete => 1.0,
        }
    }

    /// The stage after this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            ScanProgress::Started => Some(ScanProgress::DecodeInFlight),
            ScanProgress::DecodeInFlight => Some(ScanProgress::DecodeComplete),
            ScanProgress::DecodeComplete => None,
        }
    }
}

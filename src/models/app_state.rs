use crate::models::{ScanResult, Theme};

/// Placeholder shown in the camera tab while no session is active.
pub const CAMERA_PLACEHOLDER: &str = "Camera feed will appear here";

/// Everything the window displays, owned by the UI thread.
///
/// This is the view model behind the presentation layer. Background work never
/// touches it directly: results arrive as [`crate::services::ScanEvent`]s and
/// are applied by [`crate::state::StateManager`], which diffs the old and new
/// value into [`crate::state::StateChange`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub theme: Theme,

    /// Progress indicator value; `None` hides the indicator.
    pub progress: Option<f32>,

    // Results area
    pub result_text: String,
    pub result_is_error: bool,
    pub last_payload: Option<String>,

    pub camera_active: bool,
    pub history_text: String,

    /// Id of the scan whose events are currently displayed. Events from any
    /// other scan are stale and ignored.
    pub active_scan: Option<u64>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            progress: None,
            result_text: String::new(),
            result_is_error: false,
            last_payload: None,
            camera_active: false,
            history_text: String::new(),
            active_scan: None,
        }
    }
}

impl AppState {
    /// The copy button is only useful when there is a decoded payload.
    pub fn copy_enabled(&self) -> bool {
        self.last_payload.is_some()
    }

    /// Begin displaying a new scan.
    pub fn begin_scan(&mut self, scan_id: u64) {
        self.active_scan = Some(scan_id);
        self.progress = Some(0.0);
    }

    /// Show a finished decode in the results area.
    pub fn show_result(&mut self, result: &ScanResult) {
        self.result_text = result.display_text();
        self.result_is_error = !result.found;
        self.last_payload = result.payload.clone();
    }

    /// Show an error message and reset the progress indicator.
    pub fn show_error(&mut self, message: impl Into<String>) {
        self.progress = None;
        self.result_text = message.into();
        self.result_is_error = true;
        self.last_payload = None;
    }

    pub fn hide_progress(&mut self) {
        self.progress = None;
    }
}

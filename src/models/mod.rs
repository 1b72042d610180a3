//! Data models for the QR scanner.
//!
//! - [`Settings`]: user preferences persisted as JSON (theme, history on/off, camera index)
//! - [`HistoryLog`] / [`HistoryEntry`]: newest-first, timestamped scan history
//! - [`ScanResult`] / [`ScanProgress`]: outcome and progress of a single scan
//! - [`AppState`]: the view model displayed by the window, owned by the UI thread

pub mod app_state;
pub mod history;
pub mod scan;
pub mod settings;

pub use app_state::{AppState, CAMERA_PLACEHOLDER};
pub use history::{HistoryEntry, HistoryLog, TIMESTAMP_FORMAT};
pub use scan::{ScanProgress, ScanResult};
pub use settings::{Settings, Theme};

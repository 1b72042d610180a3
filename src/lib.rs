// QR Scanner - Desktop QR code scanner for image files and live camera feeds
//
// This is the library crate containing the scanning logic, persistence and
// state management. The binary crate (main.rs) provides the GUI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppState, HistoryLog, ScanProgress, ScanResult, Settings, Theme};
pub use services::{DecodePipeline, ScanError, ScanEvent, ScanOrchestrator};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

// State management module
//
// This module provides the StateManager which owns the presentation state,
// the persisted settings and the scan history, and turns every mutation into
// StateChange events for the GUI.
//
// The StateManager lives on the UI thread. Background work reaches it only
// through ScanEvents drained by the UI, so no locking is involved.

use crate::config::ConfigManager;
use crate::models::{AppState, HistoryEntry, HistoryLog, ScanProgress, Settings, Theme};
use crate::services::ScanEvent;
use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use image::RgbaImage;

/// Change events emitted when state is modified
///
/// These are returned to the caller, which applies them to the widgets.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Light/dark appearance switched
    ThemeChanged { theme: Theme },

    /// Progress indicator moved, or was hidden (`None`)
    ProgressUpdated { value: Option<f32> },

    /// Results area content changed
    ResultChanged {
        text: String,
        is_error: bool,
        copy_enabled: bool,
    },

    /// Camera session started or stopped
    CameraStateChanged { active: bool },

    /// History text changed
    HistoryUpdated { text: String },

    /// Preview of the image being scanned
    PreviewUpdated { image: RgbaImage },

    /// The displayed scan reached its final outcome
    ScanFinished { scan_id: u64, success: bool },
}

/// UI-thread state manager with change detection
///
/// This is the application context of the scanner:
/// - Holds [`AppState`] (what the window shows)
/// - Holds [`Settings`] and [`HistoryLog`] and persists them through
///   [`ConfigManager`]
/// - Detects state changes and returns [`StateChange`] events
/// - Discards events of scans superseded by a newer one
///
/// Persistence failures are logged and never abort the operation that
/// triggered them.
#[derive(Debug)]
pub struct StateManager {
    state: AppState,
    settings: Settings,
    history: HistoryLog,
    config: ConfigManager,
    /// False while a corrupt settings file has been neither fixed nor replaced
    settings_writable: bool,
}

impl StateManager {
    /// Create a StateManager from the files managed by `config`.
    ///
    /// An unreadable settings file falls back to defaults without being
    /// overwritten; an unreadable history starts empty.
    pub fn new(config: ConfigManager) -> Self {
        let (settings, settings_writable) = match config.load_settings() {
            Ok(settings) => (settings, true),
            Err(e) => {
                tracing::error!("Failed to load settings, using defaults: {:#}", e);
                (Settings::default(), false)
            }
        };

        let history = config.load_history().unwrap_or_else(|e| {
            tracing::error!("Failed to load history: {:#}", e);
            HistoryLog::new()
        });

        let mut manager = Self::with_parts(config, settings, history);
        manager.settings_writable = settings_writable;
        manager
    }

    /// Create a StateManager from already loaded values.
    pub fn with_parts(config: ConfigManager, settings: Settings, history: HistoryLog) -> Self {
        let state = AppState {
            theme: settings.theme,
            history_text: history.render(),
            ..AppState::default()
        };

        Self {
            state,
            settings,
            history,
            config,
            settings_writable: true,
        }
    }

    /// Get a snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.state.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Update the state and report what changed
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    ///
    /// # Example
    /// ```ignore
    /// state_manager.update(|state| state.hide_progress());
    /// ```
    pub fn update<F>(&mut self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let old_state = self.state.clone();
        update_fn(&mut self.state);
        Self::detect_changes(&old_state, &self.state)
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.theme != new.theme {
            changes.push(StateChange::ThemeChanged { theme: new.theme });
        }

        if old.progress != new.progress {
            changes.push(StateChange::ProgressUpdated {
                value: new.progress,
            });
        }

        if old.result_text != new.result_text
            || old.result_is_error != new.result_is_error
            || old.copy_enabled() != new.copy_enabled()
        {
            changes.push(StateChange::ResultChanged {
                text: new.result_text.clone(),
                is_error: new.result_is_error,
                copy_enabled: new.copy_enabled(),
            });
        }

        if old.camera_active != new.camera_active {
            changes.push(StateChange::CameraStateChanged {
                active: new.camera_active,
            });
        }

        if old.history_text != new.history_text {
            changes.push(StateChange::HistoryUpdated {
                text: new.history_text.clone(),
            });
        }

        changes
    }

    /// Apply one event from the scan orchestrator
    ///
    /// Events of a scan other than the one on display are ignored, except
    /// `Started`, which makes a newer scan the one on display.
    pub fn apply_scan_event(&mut self, event: ScanEvent) -> Vec<StateChange> {
        match event {
            ScanEvent::Progress {
                scan_id,
                stage: ScanProgress::Started,
            } => {
                if self.state.active_scan.is_some_and(|active| scan_id < active) {
                    return Self::discard(scan_id);
                }
                self.update(|state| state.begin_scan(scan_id))
            }

            ScanEvent::Progress { scan_id, stage } => {
                if !self.is_current(scan_id) {
                    return Self::discard(scan_id);
                }
                self.update(|state| state.progress = Some(stage.fraction()))
            }

            ScanEvent::Preview { scan_id, image } => {
                if !self.is_current(scan_id) {
                    return Self::discard(scan_id);
                }
                vec![StateChange::PreviewUpdated { image }]
            }

            ScanEvent::Finished { scan_id, outcome } => {
                if !self.is_current(scan_id) {
                    return Self::discard(scan_id);
                }

                let success = outcome.is_ok();
                let mut changes = match outcome {
                    Ok(result) => {
                        let mut changes = self.update(|state| state.show_result(&result));
                        if let Some(payload) = &result.payload {
                            changes.extend(self.append_history(payload));
                        }
                        changes
                    }
                    Err(e) => self.update(|state| state.show_error(e.to_string())),
                };

                changes.push(StateChange::ScanFinished { scan_id, success });
                changes
            }

            ScanEvent::CameraFailed { message } => self.update(|state| {
                state.camera_active = false;
                state.show_error(message);
            }),
        }
    }

    fn is_current(&self, scan_id: u64) -> bool {
        self.state.active_scan == Some(scan_id)
    }

    fn discard(scan_id: u64) -> Vec<StateChange> {
        tracing::debug!(scan_id, "Discarding event of superseded scan");
        Vec::new()
    }

    /// Hide the progress indicator if `scan_id` is still on display.
    pub fn hide_progress_for(&mut self, scan_id: u64) -> Vec<StateChange> {
        if !self.is_current(scan_id) {
            return Vec::new();
        }
        self.update(AppState::hide_progress)
    }

    /// Show an error that did not come from a scan.
    pub fn show_error(&mut self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| state.show_error(message))
    }

    pub fn set_camera_active(&mut self, active: bool) -> Vec<StateChange> {
        self.update(|state| state.camera_active = active)
    }

    /// Switch between light and dark and persist the choice.
    pub fn toggle_theme(&mut self) -> Vec<StateChange> {
        self.settings.theme = self.settings.theme.toggled();
        tracing::info!("Theme switched to {:?}", self.settings.theme);
        self.settings_writable = true;
        self.persist_settings();

        let theme = self.settings.theme;
        self.update(|state| state.theme = theme)
    }

    /// Record a decoded payload stamped with the current local time.
    pub fn append_history(&mut self, payload: &str) -> Vec<StateChange> {
        self.append_history_at(payload, Local::now().naive_local())
    }

    /// Record a decoded payload stamped with `timestamp`.
    ///
    /// Does nothing when history saving is turned off.
    pub fn append_history_at(
        &mut self,
        payload: &str,
        timestamp: NaiveDateTime,
    ) -> Vec<StateChange> {
        if !self.settings.save_history {
            return Vec::new();
        }

        let entry: HistoryEntry = self.history.append_at(payload, timestamp).clone();
        tracing::debug!("History entry added at {}", entry.timestamp);
        self.persist_history();

        let text = self.history.render();
        self.update(|state| state.history_text = text)
    }

    /// Write settings and history to disk.
    ///
    /// A settings file that failed to load stays untouched until the settings
    /// change, and history is only written while history saving is on.
    pub fn flush(&self) -> Result<()> {
        if self.settings_writable {
            self.config.save_settings(&self.settings)?;
        } else {
            tracing::warn!("Keeping unreadable settings file {}", self.config.settings_path());
        }
        if self.settings.save_history {
            self.config.save_history(&self.history)?;
        }
        tracing::info!("Settings and history flushed to {}", self.config.data_dir());
        Ok(())
    }

    fn persist_settings(&self) {
        if let Err(e) = self.config.save_settings(&self.settings) {
            tracing::error!("Failed to save settings: {:#}", e);
        }
    }

    fn persist_history(&self) {
        if let Err(e) = self.config.save_history(&self.history) {
            tracing::error!("Failed to save history: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanResult;
    use crate::services::ScanError;
    use camino::Utf8PathBuf;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn manager() -> (StateManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = ConfigManager::new(root).unwrap();
        (StateManager::new(config), temp_dir)
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn progress(scan_id: u64, stage: ScanProgress) -> ScanEvent {
        ScanEvent::Progress { scan_id, stage }
    }

    fn finished(scan_id: u64, outcome: Result<ScanResult, ScanError>) -> ScanEvent {
        ScanEvent::Finished { scan_id, outcome }
    }

    #[test]
    fn test_initial_state() {
        let (manager, _temp) = manager();
        let state = manager.snapshot();

        assert_eq!(state.theme, Theme::Light);
        assert!(state.progress.is_none());
        assert!(!state.copy_enabled());
        assert!(state.history_text.is_empty());
    }

    #[test]
    fn test_update_detects_progress_change() {
        let (mut manager, _temp) = manager();

        let changes = manager.update(|state| state.progress = Some(0.3));
        assert_eq!(changes, vec![StateChange::ProgressUpdated { value: Some(0.3) }]);

        // Same value again: nothing to report
        assert!(manager.update(|state| state.progress = Some(0.3)).is_empty());
    }

    #[test]
    fn test_successful_scan_sequence() {
        let (mut manager, _temp) = manager();

        manager.apply_scan_event(progress(1, ScanProgress::Started));
        assert_eq!(manager.state().progress, Some(0.0));

        manager.apply_scan_event(progress(1, ScanProgress::DecodeInFlight));
        assert_eq!(manager.state().progress, Some(0.3));

        manager.apply_scan_event(progress(1, ScanProgress::DecodeComplete));
        assert_eq!(manager.state().progress, Some(1.0));

        let changes = manager.apply_scan_event(finished(1, Ok(ScanResult::found("HELLO"))));
        assert!(changes.contains(&StateChange::ScanFinished { scan_id: 1, success: true }));

        let state = manager.snapshot();
        assert_eq!(state.result_text, "Decoded QR content:\nHELLO");
        assert!(!state.result_is_error);
        assert!(state.copy_enabled());
        assert!(state.history_text.ends_with(" HELLO\n"));

        // Lingering indicator is hidden afterwards
        manager.hide_progress_for(1);
        assert!(manager.state().progress.is_none());
    }

    #[test]
    fn test_failed_scan_hides_progress() {
        let (mut manager, _temp) = manager();

        for stage in ScanProgress::ALL {
            manager.apply_scan_event(progress(1, stage));
        }
        let changes = manager.apply_scan_event(finished(
            1,
            Err(ScanError::ImageLoad("bad.png: not an image".to_string())),
        ));

        let state = manager.snapshot();
        assert!(state.progress.is_none());
        assert!(state.result_is_error);
        assert_eq!(state.result_text, "Error processing image: bad.png: not an image");
        assert!(changes.contains(&StateChange::ProgressUpdated { value: None }));
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_no_code_is_not_recorded() {
        let (mut manager, _temp) = manager();

        manager.apply_scan_event(progress(1, ScanProgress::Started));
        manager.apply_scan_event(finished(1, Ok(ScanResult::not_found())));

        let state = manager.snapshot();
        assert_eq!(state.result_text, "No QR code found in the image.");
        assert!(state.result_is_error);
        assert!(!state.copy_enabled());
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_superseded_scan_is_discarded() {
        let (mut manager, _temp) = manager();

        manager.apply_scan_event(progress(1, ScanProgress::Started));
        manager.apply_scan_event(progress(2, ScanProgress::Started));

        // Late result of the first scan
        let changes = manager.apply_scan_event(finished(1, Ok(ScanResult::found("OLD"))));
        assert!(changes.is_empty());
        assert!(manager.state().result_text.is_empty());

        // A late Started of an older scan does not take over either
        assert!(manager.apply_scan_event(progress(1, ScanProgress::Started)).is_empty());
        assert_eq!(manager.state().active_scan, Some(2));

        manager.apply_scan_event(finished(2, Ok(ScanResult::found("NEW"))));
        assert_eq!(manager.state().last_payload.as_deref(), Some("NEW"));
        assert!(manager.hide_progress_for(1).is_empty());
    }

    #[test]
    fn test_camera_failure_resets_camera() {
        let (mut manager, _temp) = manager();
        manager.set_camera_active(true);

        let changes = manager.apply_scan_event(ScanEvent::CameraFailed {
            message: "Camera disconnected".to_string(),
        });

        assert!(changes.contains(&StateChange::CameraStateChanged { active: false }));
        assert_eq!(manager.state().result_text, "Camera disconnected");
    }

    #[test]
    fn test_toggle_theme_persists() {
        let (mut manager, temp) = manager();

        let changes = manager.toggle_theme();
        assert_eq!(changes, vec![StateChange::ThemeChanged { theme: Theme::Dark }]);
        assert_eq!(manager.state().theme, Theme::Dark);
        assert!(manager.state().theme.is_dark());

        let saved = std::fs::read_to_string(temp.path().join("settings.json")).unwrap();
        assert!(saved.contains("\"dark\""));

        manager.toggle_theme();
        assert_eq!(manager.state().theme, Theme::Light);
    }

    #[test]
    fn test_append_history_writes_file() {
        let (mut manager, temp) = manager();

        manager.append_history_at("HELLO", at(12, 0, 0));
        let text = std::fs::read_to_string(temp.path().join("history.txt")).unwrap();
        assert_eq!(text, "2024-05-01 12:00:00 HELLO\n");

        manager.append_history_at("WORLD", at(12, 0, 5));
        let text = std::fs::read_to_string(temp.path().join("history.txt")).unwrap();
        assert_eq!(
            text,
            "2024-05-01 12:00:05 WORLD\n2024-05-01 12:00:00 HELLO\n"
        );
        assert_eq!(manager.state().history_text, text);
    }

    #[test]
    fn test_history_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = ConfigManager::new(&root).unwrap();
        let settings = Settings {
            save_history: false,
            ..Settings::default()
        };
        let mut manager = StateManager::with_parts(config, settings, HistoryLog::new());

        assert!(manager.append_history_at("HELLO", at(8, 0, 0)).is_empty());
        assert!(!root.join("history.txt").exists());
    }

    #[test]
    fn test_corrupt_settings_fall_back_without_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("settings.json"), "{ not json").unwrap();

        let manager = StateManager::new(ConfigManager::new(&root).unwrap());
        assert_eq!(manager.settings(), &Settings::default());

        let untouched = std::fs::read_to_string(root.join("settings.json")).unwrap();
        assert_eq!(untouched, "{ not json");
    }

    #[test]
    fn test_flush_keeps_corrupt_settings_until_changed() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("settings.json"), "{ not json").unwrap();

        let mut manager = StateManager::new(ConfigManager::new(&root).unwrap());
        manager.flush().unwrap();
        let untouched = std::fs::read_to_string(root.join("settings.json")).unwrap();
        assert_eq!(untouched, "{ not json");

        manager.toggle_theme();
        manager.flush().unwrap();
        let rewritten = std::fs::read_to_string(root.join("settings.json")).unwrap();
        assert!(rewritten.contains("\"dark\""));
    }

    #[test]
    fn test_flush_skips_history_when_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = ConfigManager::new(&root).unwrap();
        let settings = Settings {
            save_history: false,
            ..Settings::default()
        };
        let manager = StateManager::with_parts(config, settings, HistoryLog::new());

        manager.flush().unwrap();

        assert!(root.join("settings.json").exists());
        assert!(!root.join("history.txt").exists());
    }

    #[test]
    fn test_existing_history_shown_below_new_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("history.txt"), "2023-01-01 00:00:00 OLD\n").unwrap();

        let mut manager = StateManager::new(ConfigManager::new(&root).unwrap());
        assert_eq!(manager.state().history_text, "2023-01-01 00:00:00 OLD\n");

        manager.append_history_at("NEW", at(9, 30, 0));
        assert_eq!(
            manager.state().history_text,
            "2024-05-01 09:30:00 NEW\n2023-01-01 00:00:00 OLD\n"
        );
    }

    #[test]
    fn test_flush_writes_both_files() {
        let (mut manager, temp) = manager();
        manager.append_history_at("FLUSHED", at(1, 2, 3));
        std::fs::remove_file(temp.path().join("history.txt")).unwrap();

        manager.flush().unwrap();

        assert!(temp.path().join("settings.json").exists());
        let text = std::fs::read_to_string(temp.path().join("history.txt")).unwrap();
        assert_eq!(text, "2024-05-01 01:02:03 FLUSHED\n");
    }
}

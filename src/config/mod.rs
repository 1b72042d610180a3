use crate::models::{HistoryLog, Settings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the JSON settings file inside the data directory.
pub const SETTINGS_FILENAME: &str = "settings.json";

/// File name of the plain-text scan history inside the data directory.
pub const HISTORY_FILENAME: &str = "history.txt";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "QR_SCANNER_DATA_DIR";

/// Configuration manager for the settings and history files.
///
/// Owns the data directory and the two file paths; the actual reading and
/// writing is done by the free functions below, which only take a path and
/// an in-memory value.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    data_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    history_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `data_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data directory: {}", data_dir))?;
        }

        Ok(Self {
            settings_path: data_dir.join(SETTINGS_FILENAME),
            history_path: data_dir.join(HISTORY_FILENAME),
            data_dir,
        })
    }

    /// Resolve the default data directory.
    ///
    /// `$QR_SCANNER_DATA_DIR` wins, then `<platform data dir>/<app name>`,
    /// then the current directory.
    pub fn default_data_dir() -> Utf8PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return Utf8PathBuf::from(dir);
            }
        }

        dirs::data_dir()
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
            .map(|dir| dir.join(crate::APP_NAME))
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    /// Load settings, creating the file with defaults when it does not exist.
    pub fn load_settings(&self) -> Result<Settings> {
        load_settings(&self.settings_path)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        save_settings(&self.settings_path, settings)
    }

    /// Load the history text verbatim; a missing file is an empty history.
    pub fn load_history(&self) -> Result<HistoryLog> {
        load_history(&self.history_path)
    }

    pub fn save_history(&self, history: &HistoryLog) -> Result<()> {
        save_history(&self.history_path, history)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    pub fn history_path(&self) -> &Utf8Path {
        &self.history_path
    }
}

/// Load settings from `path`.
///
/// A missing file yields [`Settings::default`], which is written to `path`
/// straight away so the next load reads the same values back. A file that
/// exists but cannot be parsed is an error and is left untouched.
pub fn load_settings(path: &Utf8Path) -> Result<Settings> {
    if !path.exists() {
        tracing::warn!("Settings file not found at {}, writing defaults", path);
        let settings = Settings::default();
        save_settings(path, &settings)?;
        return Ok(settings);
    }

    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read settings: {}", path))?;

    let settings: Settings = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse settings: {}", path))?;

    tracing::info!("Loaded settings from {}", path);
    Ok(settings)
}

/// Write `settings` to `path` as pretty-printed JSON.
pub fn save_settings(path: &Utf8Path, settings: &Settings) -> Result<()> {
    let json =
        serde_json::to_string_pretty(settings).context("Failed to serialize settings to JSON")?;

    write_atomic(path, json.as_bytes())
        .with_context(|| format!("Failed to write settings: {}", path))?;

    tracing::debug!("Saved settings to {}", path);
    Ok(())
}

pub fn load_history(path: &Utf8Path) -> Result<HistoryLog> {
    if !path.exists() {
        tracing::debug!("History file not found at {}, starting empty", path);
        return Ok(HistoryLog::new());
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read history: {}", path))?;

    tracing::info!("Loaded history from {} ({} bytes)", path, text.len());
    Ok(HistoryLog::from_text(text))
}

/// Overwrite `path` with the full rendered history.
pub fn save_history(path: &Utf8Path, history: &HistoryLog) -> Result<()> {
    write_atomic(path, history.render().as_bytes())
        .with_context(|| format!("Failed to write history: {}", path))?;

    tracing::debug!("Saved history to {}", path);
    Ok(())
}

/// Write through a sibling temp file and rename it over `path`, so readers
/// never observe a half-written file.
fn write_atomic(path: &Utf8Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = path.file_name().unwrap_or("data");
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.settings_path().ends_with(SETTINGS_FILENAME));
        assert!(manager.history_path().ends_with(HISTORY_FILENAME));
    }

    #[test]
    fn test_creates_missing_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let nested = root.join("a").join("b");

        let manager = ConfigManager::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(manager.data_dir(), &nested);
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = Settings {
            theme: Theme::Dark,
            save_history: false,
            camera_device: 1,
        };
        manager.save_settings(&settings).unwrap();

        assert_eq!(manager.load_settings().unwrap(), settings);
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let (manager, temp_dir) = create_test_config_manager();
        manager.save_settings(&Settings::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_settings_is_error_and_untouched() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "{ not json").unwrap();

        assert!(manager.load_settings().is_err());
        assert_eq!(
            fs::read_to_string(manager.settings_path()).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_missing_history_is_empty() {
        let (manager, _temp_dir) = create_test_config_manager();
        let history = manager.load_history().unwrap();
        assert!(history.is_empty());
        assert!(!manager.history_path().exists());
    }
}

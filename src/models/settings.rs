use serde::{Deserialize, Serialize};

/// Appearance mode of the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// The other theme.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    /// Label for the toggle button: the moon switches to dark, the sun back to light.
    pub fn toggle_icon(self) -> &'static str {
        match self {
            Theme::Light => "🌙",
            Theme::Dark => "☀️",
        }
    }
}

/// User settings persisted in `settings.json`.
///
/// Every field falls back to its default individually, so a file written by an
/// older build with missing keys still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,

    #[serde(default = "default_save_history")]
    pub save_history: bool,

    #[serde(default)]
    pub camera_device: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            save_history: true,
            camera_device: 0,
        }
    }
}

fn default_save_history() -> bool {
    true
}

//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CamResult;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application-private directory where recordings are written.
    pub media_dir: PathBuf,

    /// Root of the user's shared media library. Finished photos land in
    /// `Pictures/`, videos in `Videos/`.
    pub library_dir: PathBuf,

    /// Default capture settings.
    pub capture: CaptureDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// JPEG quality for still photos (1-100).
    pub photo_quality: u8,

    /// Which capture backend to use.
    pub backend: BackendKind,

    /// Gesture behaviours installed at setup.
    pub gestures: GestureDefaults,
}

/// Capture backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Platform backend when available, simulated otherwise.
    #[default]
    Auto,
    Gstreamer,
    Simulated,
}

/// Which gestures are installed on the preview surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureDefaults {
    /// Single tap moves the focus/exposure point.
    pub focus: bool,
    /// Pinch changes the zoom factor.
    pub zoom: bool,
    /// Double tap switches between front and back cameras.
    pub toggle: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "camkit=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            library_dir: default_library_dir(),
            capture: CaptureDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            photo_quality: 90,
            backend: BackendKind::Auto,
            gestures: GestureDefaults::default(),
        }
    }
}

impl Default for GestureDefaults {
    fn default() -> Self {
        Self {
            focus: false,
            zoom: true,
            toggle: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> CamResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> CamResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("camkit").join("config.json")
}

/// Default application-private media directory.
fn default_media_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    base.join("camkit").join("media")
}

/// Default shared media library root.
fn default_library_dir() -> PathBuf {
    home_dir()
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "capture": { "photo_quality": 75, "gestures": { "focus": true } } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.capture.photo_quality, 75);
        assert!(config.capture.gestures.focus);
        assert!(config.capture.gestures.zoom);
        assert!(config.capture.gestures.toggle);
        assert_eq!(config.capture.backend, BackendKind::Auto);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unparsable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.capture.photo_quality, 90);
        assert!(!config.capture.gestures.focus);
    }

    #[test]
    fn save_then_load_preserves_backend_choice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.capture.backend = BackendKind::Simulated;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.capture.backend, BackendKind::Simulated);
    }

    #[test]
    fn save_into_a_file_path_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = AppConfig::default()
            .save_to(&blocker.join("config.json"))
            .unwrap_err();
        assert!(matches!(err, crate::error::CamError::Io(_)));
    }
}

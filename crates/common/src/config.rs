//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory that receives one sub-directory per session.
    pub recordings_dir: PathBuf,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Capture and encoder parameters applied to every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Upper bound on the screen capture frame rate.
    pub screen_fps: u32,

    /// Average bitrate of the screen encoder (kbit/s).
    pub screen_bitrate_kbps: u32,

    /// Whether the system cursor is drawn into the screen capture.
    pub show_cursor: bool,

    /// Average bitrate of the webcam encoder (kbit/s).
    pub webcam_bitrate_kbps: u32,

    /// Audio output sample rate.
    pub audio_sample_rate: u32,

    /// Audio output channel count.
    pub audio_channels: u32,

    /// Average bitrate of the AAC encoder (bit/s).
    pub audio_bitrate: u32,

    /// How many samples a source or writer may hold before new samples are
    /// dropped instead of queued.
    pub queue_depth: u32,

    /// Maximum time allowed for an encoder to drain on stop (seconds).
    pub finalize_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "presenter=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            recording: RecordingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            screen_fps: 60,
            screen_bitrate_kbps: 20_000,
            show_cursor: true,
            webcam_bitrate_kbps: 2_500,
            audio_sample_rate: 44_100,
            audio_channels: 2,
            audio_bitrate: 128_000,
            queue_depth: 5,
            finalize_timeout_secs: 10,
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

    /// Load config from an explicit path, falling back to defaults when the
    /// file is missing or unreadable.
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
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("presenter").join("config.json")
}

/// Default recordings root: `~/Desktop/recordings`.
fn default_recordings_dir() -> PathBuf {
    home_dir().join("Desktop").join("recordings")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recorder_parameters() {
        let defaults = RecordingDefaults::default();
        assert_eq!(defaults.audio_sample_rate, 44_100);
        assert_eq!(defaults.audio_channels, 2);
        assert_eq!(defaults.screen_bitrate_kbps, 20_000);
        assert_eq!(defaults.queue_depth, 5);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"recordings_dir":"/srv/talks","recording":{"screen_fps":30}}"#)
            .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.recordings_dir, PathBuf::from("/srv/talks"));
        assert_eq!(config.recording.screen_fps, 30);
        assert_eq!(config.recording.audio_sample_rate, 44_100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unparsable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.recording.screen_fps, 60);
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.recording.webcam_bitrate_kbps = 4_000;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.recording.webcam_bitrate_kbps, 4_000);
    }
}

//! Pipeline settings: a serde struct loaded from a JSON file with
//! semantic validation, plus sensible defaults for every field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime settings for the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Worker thread count; 0 means one per available hardware thread.
    pub worker_count: usize,
    /// Upper bound on an idle worker's sleep before it asks for work
    /// again, in seconds.
    pub idle_wake_secs: u64,
    /// Path or name of the ffprobe binary.
    pub ffprobe_path: PathBuf,
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: PathBuf,
    /// Neither thumbnail dimension will exceed this, in pixels.
    pub thumbnail_bound: u32,
    /// Watchdog timeout for a single external tool invocation, in
    /// seconds.
    pub tool_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("mediaprep.db"),
            worker_count: 0,
            idle_wake_secs: 30,
            ffprobe_path: PathBuf::from("ffprobe"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            thumbnail_bound: 400,
            tool_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Resolves `worker_count = 0` to the available hardware parallelism.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_count
        }
    }
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.idle_wake_secs == 0 {
        return Err(ConfigError::Validation {
            message: "idle_wake_secs must be greater than 0".to_string(),
        });
    }
    if settings.thumbnail_bound == 0 {
        return Err(ConfigError::Validation {
            message: "thumbnail_bound must be greater than 0".to_string(),
        });
    }
    if settings.tool_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "tool_timeout_secs must be greater than 0".to_string(),
        });
    }
    if settings.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "database_path must not be empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.idle_wake_secs, 30);
        assert_eq!(settings.thumbnail_bound, 400);
        assert_eq!(settings.tool_timeout_secs, 30);
        assert!(settings.effective_worker_count() >= 1);
    }

    #[test]
    fn test_load_from_str_with_partial_fields() {
        let settings = load_settings_from_str(
            r#"{ "worker_count": 3, "idle_wake_secs": 5 }"#,
        )
        .unwrap();
        assert_eq!(settings.worker_count, 3);
        assert_eq!(settings.effective_worker_count(), 3);
        assert_eq!(settings.idle_wake_secs, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(settings.ffprobe_path, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "thumbnail_bound": 256 }"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.thumbnail_bound, 256);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_settings("/nonexistent/settings.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let result = load_settings_from_str("not json at all");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_zero_idle_wake_rejected() {
        let result = load_settings_from_str(r#"{ "idle_wake_secs": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_zero_thumbnail_bound_rejected() {
        let result = load_settings_from_str(r#"{ "thumbnail_bound": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}

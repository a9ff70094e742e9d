//! Application settings.
//!
//! Settings live in a flat JSON file (`settings.json` by default). Loading
//! never fails: a missing file, unreadable file, malformed JSON, or a field
//! of the wrong type each fall back to the built-in default for the affected
//! fields. Saving writes the whole record to a temp file and renames it over
//! the target so a crash mid-write cannot corrupt the next load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::capture::SourceDescriptor;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_VIDEO_WIDTH: u32 = 1280;
const DEFAULT_VIDEO_HEIGHT: u32 = 720;
const DEFAULT_SIDEBAR_WIDTH: u32 = 350;
const DEFAULT_LOG_LEVEL: &str = "INFO";

/// The full settings record. Always fully populated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    /// Minimum confidence for a detection to be reported. Clamped to [0, 1].
    pub confidence_threshold: f32,
    /// Path of the last loaded model file. Empty when none was loaded yet.
    pub last_model: String,
    /// Last selected capture source.
    pub last_source: SourceDescriptor,
    pub video_width: u32,
    pub video_height: u32,
    /// Render confidence values into detection labels.
    pub show_confidence: bool,
    /// Render class names into detection labels.
    pub show_class_names: bool,
    pub sidebar_width: u32,
    /// Persist a snapshot automatically whenever one is captured.
    pub auto_save_snapshots: bool,
    /// Log level name understood by the `log` facade (e.g. "INFO", "DEBUG").
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            last_model: String::new(),
            last_source: SourceDescriptor::Webcam(0),
            video_width: DEFAULT_VIDEO_WIDTH,
            video_height: DEFAULT_VIDEO_HEIGHT,
            show_confidence: true,
            show_class_names: true,
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            auto_save_snapshots: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, substituting defaults for anything missing
    /// or unparsable. Never fails.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                log::info!(
                    "no settings file at {}, using defaults ({})",
                    path.display(),
                    err
                );
                return Self::default();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::from_value(&value),
            Err(err) => {
                log::warn!(
                    "settings file {} is not valid JSON, using defaults ({})",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Extract fields one by one so a single bad field cannot poison the rest.
    fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        Self {
            confidence_threshold: clamp_threshold(
                f32_field(value, "confidence_threshold")
                    .unwrap_or(defaults.confidence_threshold),
            ),
            last_model: string_field(value, "last_model").unwrap_or(defaults.last_model),
            last_source: value
                .get("last_source")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or(defaults.last_source),
            video_width: u32_field(value, "video_width").unwrap_or(defaults.video_width),
            video_height: u32_field(value, "video_height").unwrap_or(defaults.video_height),
            show_confidence: bool_field(value, "show_confidence")
                .unwrap_or(defaults.show_confidence),
            show_class_names: bool_field(value, "show_class_names")
                .unwrap_or(defaults.show_class_names),
            sidebar_width: u32_field(value, "sidebar_width").unwrap_or(defaults.sidebar_width),
            auto_save_snapshots: bool_field(value, "auto_save_snapshots")
                .unwrap_or(defaults.auto_save_snapshots),
            log_level: string_field(value, "log_level").unwrap_or(defaults.log_level),
        }
    }

    /// Persist the whole record atomically (write temp, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize settings")?;
        let tmp = tmp_path(path);
        fs::write(&tmp, json)
            .with_context(|| format!("write settings temp file {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("replace settings file {}", path.display()))?;
        log::debug!("settings saved to {}", path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Confidence thresholds from a corrupt file are clamped rather than rejected.
pub fn clamp_threshold(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_CONFIDENCE_THRESHOLD;
    }
    value.clamp(0.0, 1.0)
}

fn f32_field(value: &Value, key: &str) -> Option<f32> {
    value.get(key)?.as_f64().map(|v| v as f32)
}

fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value.get(key)?.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn bool_field(value: &Value, key: &str) -> Option<bool> {
    value.get(key)?.as_bool()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_documented_defaults() {
        let settings = Settings::from_value(&serde_json::json!({}));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.confidence_threshold, 0.5);
        assert_eq!(settings.last_source, SourceDescriptor::Webcam(0));
        assert!(settings.show_confidence);
        assert!(settings.show_class_names);
        assert_eq!(settings.video_width, 1280);
        assert_eq!(settings.video_height, 720);
    }

    #[test]
    fn wrong_typed_field_falls_back_alone() {
        let settings = Settings::from_value(&serde_json::json!({
            "confidence_threshold": "high",
            "video_width": 1920,
        }));
        assert_eq!(settings.confidence_threshold, 0.5);
        assert_eq!(settings.video_width, 1920);
    }

    #[test]
    fn out_of_range_threshold_is_clamped() {
        let settings = Settings::from_value(&serde_json::json!({
            "confidence_threshold": 3.5,
        }));
        assert_eq!(settings.confidence_threshold, 1.0);

        let settings = Settings::from_value(&serde_json::json!({
            "confidence_threshold": -0.25,
        }));
        assert_eq!(settings.confidence_threshold, 0.0);
    }

    #[test]
    fn integer_threshold_is_coerced() {
        let settings = Settings::from_value(&serde_json::json!({
            "confidence_threshold": 1,
        }));
        assert_eq!(settings.confidence_threshold, 1.0);
    }

    #[test]
    fn source_descriptor_accepts_all_wire_shapes() {
        let settings = Settings::from_value(&serde_json::json!({ "last_source": 2 }));
        assert_eq!(settings.last_source, SourceDescriptor::Webcam(2));

        let settings =
            Settings::from_value(&serde_json::json!({ "last_source": "clips/run.mp4" }));
        assert_eq!(
            settings.last_source,
            SourceDescriptor::VideoFile("clips/run.mp4".into())
        );

        let settings =
            Settings::from_value(&serde_json::json!({ "last_source": { "industrial": 1 } }));
        assert_eq!(settings.last_source, SourceDescriptor::Industrial(1));
    }
}

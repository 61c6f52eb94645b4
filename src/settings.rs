//! Runtime settings read by the report engine
//!
//! Two values are owned by the admin side: how long report results stay
//! cached and which date range the dashboard opens with. Both can change
//! while the process runs; the engine reads the cache duration on every
//! call and never caches it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};

/// Cache duration used when nothing is configured (one hour)
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 3600;

/// Date range the dashboard opens with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRangePreset {
    Last30Days,
    Last90Days,
    #[default]
    Last365Days,
    AllTime,
}

impl DateRangePreset {
    /// Parse a stored value; anything outside the allowed set becomes the default
    pub fn from_stored(value: &str) -> Self {
        match value.parse() {
            Ok(preset) => preset,
            Err(_) => {
                warn!(value = value, "Invalid default range, using 365");
                Self::default()
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last30Days => "30",
            Self::Last90Days => "90",
            Self::Last365Days => "365",
            Self::AllTime => "all",
        }
    }
}

impl FromStr for DateRangePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "30" => Ok(Self::Last30Days),
            "90" => Ok(Self::Last90Days),
            "365" => Ok(Self::Last365Days),
            "all" => Ok(Self::AllTime),
            other => Err(format!("unknown date range preset: {}", other)),
        }
    }
}

impl fmt::Display for DateRangePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DateRangePreset {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Settings snapshot as served by the settings endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub cache_duration: u64,
    pub default_range: DateRangePreset,
}

/// Partial settings update. Unknown range values fall back to the default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub cache_duration: Option<i64>,
    pub default_range: Option<serde_json::Value>,
}

/// Process-wide admin settings
#[derive(Debug)]
pub struct AdminSettings {
    cache_duration: AtomicU64,
    default_range: RwLock<DateRangePreset>,
}

impl AdminSettings {
    pub fn new(cache_duration: u64, default_range: DateRangePreset) -> Self {
        Self {
            cache_duration: AtomicU64::new(cache_duration),
            default_range: RwLock::new(default_range),
        }
    }

    /// Cache duration in seconds; `0` disables caching
    pub fn cache_duration(&self) -> u64 {
        self.cache_duration.load(Ordering::Relaxed)
    }

    pub fn set_cache_duration(&self, seconds: u64) {
        self.cache_duration.store(seconds, Ordering::Relaxed);
    }

    pub fn default_range(&self) -> DateRangePreset {
        self.default_range
            .read()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub fn set_default_range(&self, preset: DateRangePreset) {
        if let Ok(mut guard) = self.default_range.write() {
            *guard = preset;
        }
    }

    pub fn view(&self) -> SettingsView {
        SettingsView {
            cache_duration: self.cache_duration(),
            default_range: self.default_range(),
        }
    }

    /// Apply an update the way the settings form sanitizes input:
    /// durations are taken as absolute integers, ranges outside the allowed
    /// set are replaced with the default.
    pub fn apply(&self, update: SettingsUpdate) -> SettingsView {
        if let Some(duration) = update.cache_duration {
            self.set_cache_duration(duration.unsigned_abs());
        }
        if let Some(range) = update.default_range {
            let raw = match range {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            self.set_default_range(DateRangePreset::from_stored(&raw));
        }

        let view = self.view();
        info!(
            cache_duration = view.cache_duration,
            default_range = %view.default_range,
            "Settings updated"
        );
        view
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DURATION_SECS, DateRangePreset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_range_sanitizing() {
        assert_eq!(DateRangePreset::from_stored("30"), DateRangePreset::Last30Days);
        assert_eq!(DateRangePreset::from_stored("all"), DateRangePreset::AllTime);
        assert_eq!(DateRangePreset::from_stored("45"), DateRangePreset::Last365Days);
        assert_eq!(DateRangePreset::from_stored(""), DateRangePreset::Last365Days);
    }

    #[test]
    fn test_preset_stored_form() {
        for preset in [
            DateRangePreset::Last30Days,
            DateRangePreset::Last90Days,
            DateRangePreset::Last365Days,
            DateRangePreset::AllTime,
        ] {
            assert_eq!(DateRangePreset::from_stored(preset.as_str()), preset);
        }
        assert_eq!(" 90 ".parse::<DateRangePreset>(), Ok(DateRangePreset::Last90Days));
    }

    #[test]
    fn test_apply_update() {
        let settings = AdminSettings::default();
        assert_eq!(settings.cache_duration(), 3600);

        let view = settings.apply(SettingsUpdate {
            cache_duration: Some(-120),
            default_range: Some(json!(90)),
        });
        assert_eq!(view.cache_duration, 120);
        assert_eq!(view.default_range, DateRangePreset::Last90Days);

        let view = settings.apply(SettingsUpdate {
            cache_duration: None,
            default_range: Some(json!("weekly")),
        });
        assert_eq!(view.cache_duration, 120);
        assert_eq!(view.default_range, DateRangePreset::Last365Days);
    }

    #[test]
    fn test_view_serializes_range_as_string() {
        let settings = AdminSettings::new(0, DateRangePreset::AllTime);
        let body = serde_json::to_value(settings.view()).unwrap();
        assert_eq!(body, json!({"cache_duration": 0, "default_range": "all"}));
    }
}

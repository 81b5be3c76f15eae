use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::motion::DetectorConfig;

pub const CONFIG_ENV: &str = "SMART_ALARM_CONFIG";
pub const DEBUG_ENV: &str = "SMART_ALARM_DEBUG";
pub const DEFAULT_CONFIG_PATH: &str = "smart_alarm.json";

const DEBUG_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub min_duration_secs: f64,
    pub warmup_frames: u32,
    pub sensitivity: u64,
    pub settle_ms: u64,
    pub camera_index: u32,
    /// Hard ceiling on one verification.
    pub max_wait_secs: u64,
    /// Root holding one `video<n>` directory of frames per device.
    pub frames_dir: PathBuf,
    pub frame_rate: Option<u32>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.5,
            warmup_frames: 20,
            sensitivity: 1_200_000,
            settle_ms: 2000,
            camera_index: 0,
            max_wait_secs: 60,
            frames_dir: PathBuf::from("frames"),
            frame_rate: Some(10),
        }
    }
}

impl DetectorSettings {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            // Negative or NaN durations collapse to zero.
            min_duration: Duration::try_from_secs_f64(self.min_duration_secs)
                .unwrap_or(Duration::ZERO),
            warmup_frames: self.warmup_frames,
            sensitivity: self.sensitivity,
            settle_time: Duration::from_millis(self.settle_ms),
            camera_index: self.camera_index,
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSettings {
    pub poll_interval_secs: u64,
    pub chime_hz: f32,
    pub volume: f32,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            chime_hz: 880.0,
            volume: 0.8,
        }
    }
}

impl AlarmSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub database_path: PathBuf,
    pub detector: DetectorSettings,
    pub alarm: AlarmSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("smart_alarm.sqlite3"),
            detector: DetectorSettings::default(),
            alarm: AlarmSettings::default(),
        }
    }
}

/// JSON-backed settings. Missing keys take their defaults, so an older file
/// keeps working after new fields are added.
pub struct SettingsStore {
    path: PathBuf,
    debug: bool,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Reads `SMART_ALARM_CONFIG` (default `smart_alarm.json`) and the debug
    /// flag from the environment.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let debug = std::env::var(DEBUG_ENV)
            .map(|value| !matches!(value.trim(), "" | "0" | "false"))
            .unwrap_or(false);

        let store = Self::new(path)?;
        Ok(store.with_debug(debug))
    }

    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings in {}: {err}; using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            debug: false,
            data: RwLock::new(data),
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn detector(&self) -> DetectorSettings {
        self.read().detector.clone()
    }

    pub fn alarm(&self) -> AlarmSettings {
        self.read().alarm.clone()
    }

    pub fn database_path(&self) -> PathBuf {
        self.read().database_path.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        if self.debug {
            DEBUG_POLL_INTERVAL
        } else {
            self.read().alarm.poll_interval()
        }
    }

    pub fn update_alarm(&self, settings: AlarmSettings) -> Result<()> {
        let mut guard = self.write();
        guard.alarm = settings;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("smart-alarm-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_uses_defaults() {
        let store = SettingsStore::new(temp_path()).unwrap();
        let config = store.detector().detector_config();

        assert_eq!(config, DetectorConfig::default());
        assert_eq!(store.poll_interval(), Duration::from_secs(5));
        assert_eq!(store.detector().max_wait(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = temp_path();
        fs::write(&path, r#"{"detector": {"sensitivity": 500000, "min_duration_secs": 0.5}}"#)
            .unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        let config = store.detector().detector_config();
        assert_eq!(config.sensitivity, 500_000);
        assert_eq!(config.min_duration, Duration::from_millis(500));
        assert_eq!(config.warmup_frames, 20);
        assert_eq!(store.alarm(), AlarmSettings::default());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn unreadable_json_falls_back() {
        let path = temp_path();
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn updates_persist() {
        let path = temp_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_alarm(AlarmSettings {
                poll_interval_secs: 30,
                ..AlarmSettings::default()
            })
            .unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reloaded.poll_interval(), Duration::from_secs(30));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn debug_flag_shortens_polling() {
        let store = SettingsStore::new(temp_path()).unwrap().with_debug(true);
        assert_eq!(store.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn negative_duration_collapses_to_zero() {
        let settings = DetectorSettings {
            min_duration_secs: -2.0,
            ..DetectorSettings::default()
        };
        assert_eq!(settings.detector_config().min_duration, Duration::ZERO);
    }
}

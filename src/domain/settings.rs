use crate::domain::diagnostic_log::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "microbit_ble".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Per-stage discovery deadlines in milliseconds. Zero disables a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryTimeouts {
    #[serde(default = "default_stage_timeout_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_stage_timeout_ms")]
    pub service_discovery_ms: u64,
    #[serde(default = "default_stage_timeout_ms")]
    pub characteristic_discovery_ms: u64,
}

impl Default for DiscoveryTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: default_stage_timeout_ms(),
            service_discovery_ms: default_stage_timeout_ms(),
            characteristic_discovery_ms: default_stage_timeout_ms(),
        }
    }
}

impl DiscoveryTimeouts {
    /// No deadlines at all
    pub fn disabled() -> Self {
        Self {
            connect_ms: 0,
            service_discovery_ms: 0,
            characteristic_discovery_ms: 0,
        }
    }

    pub fn connect(&self) -> Option<Duration> {
        non_zero_ms(self.connect_ms)
    }

    pub fn service_discovery(&self) -> Option<Duration> {
        non_zero_ms(self.service_discovery_ms)
    }

    pub fn characteristic_discovery(&self) -> Option<Duration> {
        non_zero_ms(self.characteristic_discovery_ms)
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn default_stage_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Advertised local name of the target micro:bit, matched exactly
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_log_capacity")]
    pub diagnostic_log_capacity: usize,

    /// Largest UART write in bytes
    #[serde(default = "default_uart_chunk_size")]
    pub uart_chunk_size: usize,

    #[serde(default)]
    pub discovery_timeouts: DiscoveryTimeouts,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            diagnostic_log_capacity: default_log_capacity(),
            uart_chunk_size: default_uart_chunk_size(),
            discovery_timeouts: DiscoveryTimeouts::default(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "BBC micro:bit".to_string()
}
fn default_log_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_uart_chunk_size() -> usize {
    20
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults if it is missing or invalid
    pub fn from_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("MicrobitBle");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn set_device_name(&mut self, name: impl Into<String>) -> anyhow::Result<()> {
        self.settings.device_name = name.into();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.diagnostic_log_capacity, 100);
        assert_eq!(settings.uart_chunk_size, 20);
        assert_eq!(
            settings.discovery_timeouts.connect(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(DiscoveryTimeouts::disabled().service_discovery(), None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "device_name": "BBC micro:bit [abcde]" }"#).unwrap();
        assert_eq!(settings.device_name, "BBC micro:bit [abcde]");
        assert_eq!(settings.uart_chunk_size, 20);
        assert_eq!(settings.log_settings, LogSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::from_path(&path);
        assert_eq!(service.get(), &Settings::default());

        service.get_mut().discovery_timeouts.connect_ms = 0;
        service.set_device_name("BBC micro:bit [zuvip]").unwrap();

        let reloaded = SettingsService::from_path(&path);
        assert_eq!(reloaded.get().device_name, "BBC micro:bit [zuvip]");
        assert_eq!(reloaded.get().discovery_timeouts.connect(), None);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let service = SettingsService::from_path(&path);
        assert_eq!(service.get(), &Settings::default());
        assert_eq!(service.path(), path.as_path());
    }
}

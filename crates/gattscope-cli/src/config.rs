//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gattscope_core::discovery::{DEFAULT_POLL_INTERVAL, DEFAULT_SCAN_DURATION};
use serde::{Deserialize, Serialize};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 15;

/// CSV export written by `scan` unless disabled.
pub const DEFAULT_CSV_FILE: &str = "ble_devices.csv";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default peripheral address
    #[serde(default)]
    pub device: Option<String>,

    /// Scan duration in seconds
    #[serde(default)]
    pub scan_duration: Option<u64>,

    /// Scan poll interval in milliseconds
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Log file written alongside stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// CSV export path used by `scan` when none is given
    #[serde(default)]
    pub csv_file: Option<PathBuf>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gattscope")
            .join("config.toml")
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::load_or_default(&Self::path())
    }

    /// Load config from `path`, warning and falling back to defaults on error.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load and parse config from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

/// Resolve device from arg (which already covers the env var), or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve the scan duration: flag, then config, then the engine default.
pub fn resolve_scan_duration(arg: Option<u64>, config: &Config) -> Duration {
    arg.or(config.scan_duration)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SCAN_DURATION)
}

/// Resolve the poll interval: flag, then config, then the engine default.
pub fn resolve_poll_interval(arg: Option<u64>, config: &Config) -> Duration {
    arg.or(config.poll_interval_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}

/// Resolve the connect timeout: flag, then config, then the default.
pub fn resolve_timeout(arg: Option<u64>, config: &Config) -> Duration {
    Duration::from_secs(
        arg.or(config.connect_timeout)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
    )
}

/// Resolve the scan export path: flag, then config, then the default file.
/// `--no-csv` disables the export.
pub fn resolve_csv_file(arg: Option<PathBuf>, no_csv: bool, config: &Config) -> Option<PathBuf> {
    if no_csv {
        return None;
    }
    Some(
        resolve_path(arg, config.csv_file.as_ref())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_FILE)),
    )
}

/// Resolve a path-valued option: flag first, then config.
pub fn resolve_path(arg: Option<PathBuf>, configured: Option<&PathBuf>) -> Option<PathBuf> {
    arg.or_else(|| configured.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let result = resolve_device(Some("arg-device".to_string()), &config);
        assert_eq!(result, Some("arg-device".to_string()));
    }

    #[test]
    fn test_resolve_device_falls_back_to_config() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_device(None, &config), Some("config-device".to_string()));
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_scan_settings_precedence() {
        let config = Config {
            scan_duration: Some(12),
            poll_interval_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(resolve_scan_duration(Some(5), &config), Duration::from_secs(5));
        assert_eq!(resolve_scan_duration(None, &config), Duration::from_secs(12));
        assert_eq!(
            resolve_scan_duration(None, &Config::default()),
            Duration::from_secs(30)
        );
        assert_eq!(resolve_poll_interval(None, &config), Duration::from_millis(250));
        assert_eq!(
            resolve_poll_interval(None, &Config::default()),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_resolve_timeout() {
        let config = Config {
            connect_timeout: Some(60),
            ..Default::default()
        };
        assert_eq!(resolve_timeout(Some(45), &config), Duration::from_secs(45));
        assert_eq!(resolve_timeout(None, &config), Duration::from_secs(60));
        assert_eq!(
            resolve_timeout(None, &Config::default()),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT)
        );
    }

    #[test]
    fn test_log_file_only_when_configured() {
        assert_eq!(resolve_path(None, None), None);
        let configured = PathBuf::from("ble_scan.log");
        assert_eq!(
            resolve_path(None, Some(&configured)),
            Some(PathBuf::from("ble_scan.log"))
        );
        assert_eq!(
            resolve_path(Some(PathBuf::from("other.log")), Some(&configured)),
            Some(PathBuf::from("other.log"))
        );
    }

    #[test]
    fn test_csv_export_defaults_on() {
        let config = Config {
            csv_file: Some(PathBuf::from("configured.csv")),
            ..Default::default()
        };
        assert_eq!(
            resolve_csv_file(None, false, &Config::default()),
            Some(PathBuf::from(DEFAULT_CSV_FILE))
        );
        assert_eq!(
            resolve_csv_file(None, false, &config),
            Some(PathBuf::from("configured.csv"))
        );
        assert_eq!(
            resolve_csv_file(Some(PathBuf::from("out.csv")), false, &config),
            Some(PathBuf::from("out.csv"))
        );
        assert_eq!(resolve_csv_file(None, true, &config), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "scan_duration = 10\npoll_interval_ms = 200\nlog_file = \"ble_scan.log\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scan_duration, Some(10));
        assert_eq!(config.poll_interval_ms, Some(200));
        assert_eq!(config.log_file, Some(PathBuf::from("ble_scan.log")));
        assert_eq!(config.csv_file, None);
    }

    #[test]
    fn test_invalid_config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_duration = \"soon\"").unwrap();

        assert!(Config::load_from(&path).is_err());
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::load_or_default(&dir.path().join("absent.toml")),
            Config::default()
        );
    }
}

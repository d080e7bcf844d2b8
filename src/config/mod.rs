//! Configuration module for SuperADS
//!
//! This module handles application configuration including:
//! - Session timing (health monitor interval, status drain tick, press cooldown)
//! - ADS port conventions per device variant
//! - Location of the persisted symbol overrides
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.superads.superads-rs/`
//! - **macOS**: `~/Library/Application Support/dev.superads.superads-rs/`
//! - **Windows**: `%APPDATA%\dev.superads.superads-rs\`
//!
//! # Files
//!
//! - `config.json` - Application configuration
//! - `variable_overrides.json` - User-edited symbol names (see [`crate::variables`])
//! - `logs/` - Rolling log files written by the console binary

use crate::error::{AdsError, Result, ResultExt};
use crate::types::DeviceVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.superads.superads-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.json";

/// Symbol overrides filename
pub const OVERRIDES_FILE: &str = "variable_overrides.json";

/// Default health monitor interval in milliseconds
pub const DEFAULT_HEALTH_INTERVAL_MS: u64 = 1000;

/// Default status consumer tick in milliseconds
pub const DEFAULT_STATUS_TICK_MS: u64 = 100;

/// Default per-control cooldown after a release in milliseconds
pub const DEFAULT_COOLDOWN_MS: u64 = 100;

/// Default time to wait for the device link to answer a request
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 2000;

/// ADS port of V2 runtimes
pub const V2_ADS_PORT: u16 = 801;

/// ADS port of V3 runtimes
pub const V3_ADS_PORT: u16 = 851;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        AdsError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            AdsError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Session Config ====================

/// Timing of the background tasks tied to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between run-state probes while connected
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    /// Interval at which queued status events are applied to the sink
    #[serde(default = "default_status_tick_ms")]
    pub status_tick_ms: u64,

    /// Refractory window after a release during which presses are ignored
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// How long a request may sit queued behind the device link before its
    /// caller gives up; a request the link has started is always awaited
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Read every control's remote value on each monitor tick
    #[serde(default = "default_true")]
    pub refresh_control_states: bool,
}

fn default_health_interval_ms() -> u64 {
    DEFAULT_HEALTH_INTERVAL_MS
}

fn default_status_tick_ms() -> u64 {
    DEFAULT_STATUS_TICK_MS
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_reply_timeout_ms() -> u64 {
    DEFAULT_REPLY_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            health_interval_ms: DEFAULT_HEALTH_INTERVAL_MS,
            status_tick_ms: DEFAULT_STATUS_TICK_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            refresh_control_states: true,
        }
    }
}

impl SessionConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms.max(1))
    }

    pub fn status_tick(&self) -> Duration {
        Duration::from_millis(self.status_tick_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms.max(1))
    }
}

// ==================== Port Config ====================

/// ADS port per device variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_v2_port")]
    pub v2: u16,
    #[serde(default = "default_v3_port")]
    pub v3: u16,
}

fn default_v2_port() -> u16 {
    V2_ADS_PORT
}

fn default_v3_port() -> u16 {
    V3_ADS_PORT
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            v2: V2_ADS_PORT,
            v3: V3_ADS_PORT,
        }
    }
}

impl PortConfig {
    /// Port to open for a device of the given variant
    pub fn port_for(&self, variant: DeviceVariant) -> u16 {
        match variant {
            DeviceVariant::V2 => self.v2,
            DeviceVariant::V3 => self.v3,
        }
    }
}

// ==================== App Config ====================

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Background task timing
    #[serde(default)]
    pub session: SessionConfig,

    /// Port conventions
    #[serde(default)]
    pub ports: PortConfig,

    /// Explicit location of the overrides file (defaults to the app data directory)
    #[serde(default)]
    pub overrides_path: Option<PathBuf>,
}

fn default_config_version() -> u32 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            session: SessionConfig::default(),
            ports: PortConfig::default(),
            overrides_path: None,
        }
    }
}

impl AppConfig {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            AdsError::Config("Could not determine config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdsError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        serde_json::from_str::<Self>(&content)
            .map_err(AdsError::from)
            .with_context(|| format!("Failed to parse config {:?}", path))
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AdsError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;

        std::fs::write(path, content)
            .map_err(|e| AdsError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }

    /// Resolve where the symbol overrides live
    pub fn overrides_path(&self) -> Result<PathBuf> {
        match &self.overrides_path {
            Some(path) => Ok(path.clone()),
            None => app_data_dir().map(|p| p.join(OVERRIDES_FILE)).ok_or_else(|| {
                AdsError::Config("Could not determine overrides path".to_string())
            }),
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.session.health_interval(), Duration::from_secs(1));
        assert_eq!(config.session.status_tick(), Duration::from_millis(100));
        assert_eq!(config.session.cooldown(), Duration::from_millis(100));
        assert!(config.overrides_path.is_none());
    }

    #[test]
    fn test_port_for_variant() {
        let ports = PortConfig::default();
        assert_eq!(ports.port_for(DeviceVariant::V2), 801);
        assert_eq!(ports.port_for(DeviceVariant::V3), 851);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "session": { "cooldown_ms": 250 } }"#).unwrap();
        assert_eq!(parsed.session.cooldown_ms, 250);
        assert_eq!(parsed.session.health_interval_ms, DEFAULT_HEALTH_INTERVAL_MS);
        assert_eq!(parsed.ports, PortConfig::default());
    }

    #[test]
    fn test_config_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.ports.v3 = 852;
        config.overrides_path = Some(dir.path().join("ov.json"));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.overrides_path().unwrap(), dir.path().join("ov.json"));
    }

    #[test]
    fn test_load_from_garbage_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, AdsError::WithContext { .. }));
        assert!(matches!(err.root(), AdsError::Serialization(_)));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}

//! Runtime settings (`settings.toml` in the data directory)
//!
//! Tuning knobs for discovery, session supervision and the broker link.
//! Unlike the preference map these are never edited from within the app.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hubdeck_core::prelude::*;
use hubdeck_transport::{BrokerTransport, WsOptions};

pub const SETTINGS_FILENAME: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub discovery: DiscoverySettings,
    pub session: SessionSettings,
    pub mqtt: MqttSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// How long a discovery pass stays in flight
    pub window_ms: u64,
    pub probe_timeout_ms: u64,
    pub ws_port: u16,
    pub max_sweep_hosts: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            window_ms: 3000,
            probe_timeout_ms: 1500,
            ws_port: 81,
            max_sweep_hosts: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Interval between liveness pings while a session is open
    pub liveness_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            liveness_interval_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub keep_alive_secs: u64,
    pub transport: BrokerTransport,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            keep_alive_secs: 10,
            transport: BrokerTransport::default(),
        }
    }
}

impl Settings {
    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery.window_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.session.liveness_interval_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt.keep_alive_secs)
    }

    /// WebSocket adapter tuning derived from the discovery section
    pub fn ws_options(&self) -> WsOptions {
        WsOptions {
            port: self.discovery.ws_port,
            probe_timeout: Duration::from_millis(self.discovery.probe_timeout_ms),
            max_sweep_hosts: self.discovery.max_sweep_hosts,
            ..WsOptions::default()
        }
    }
}

/// Load settings from `<data_dir>/settings.toml`
///
/// Returns defaults if the file doesn't exist or is invalid.
pub fn load_settings(data_dir: &Path) -> Settings {
    let path = data_dir.join(SETTINGS_FILENAME);

    if !path.exists() {
        debug!("No settings file at {:?}, writing defaults", path);
        let settings = Settings::default();
        if let Err(e) = save_settings(data_dir, &settings) {
            warn!("Failed to write default settings: {}", e);
        }
        return settings;
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to `<data_dir>/settings.toml` (temp file + rename)
fn save_settings(data_dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::config(format!("Failed to create data dir: {}", e)))?;

    let path = data_dir.join(SETTINGS_FILENAME);
    let temp_path = data_dir.join(".settings.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(&temp_path, content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    info!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults_and_writes_them() {
        let temp = TempDir::new().unwrap();
        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.discovery_window(), Duration::from_secs(3));
        assert_eq!(settings.ws_options().port, 81);

        // Written once so there is a file to edit
        let written = std::fs::read_to_string(temp.path().join(SETTINGS_FILENAME)).unwrap();
        assert!(written.contains("window_ms = 3000"));
        assert_eq!(load_settings(temp.path()), settings);
    }

    #[test]
    fn test_partial_file_fills_remaining_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(SETTINGS_FILENAME),
            "[discovery]\nwindow_ms = 500\n\n[mqtt]\ntransport = \"tcp\"\n",
        )
        .unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.discovery.window_ms, 500);
        assert_eq!(settings.discovery.ws_port, 81);
        assert_eq!(settings.mqtt.transport, BrokerTransport::Tcp);
        assert_eq!(settings.session.liveness_interval_ms, 3000);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SETTINGS_FILENAME), "[discovery\nnope").unwrap();
        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.session.liveness_interval_ms = 750;
        settings.mqtt.transport = BrokerTransport::Ws;

        save_settings(temp.path(), &settings).unwrap();
        assert_eq!(load_settings(temp.path()), settings);
        assert!(!temp.path().join(".settings.toml.tmp").exists());
    }
}

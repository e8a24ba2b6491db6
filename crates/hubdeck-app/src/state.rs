//! Application state (Model in TEA pattern)

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use serde_json::Value;

use hubdeck_core::{ConnectionKind, DeviceId, DeviceRegistry, DeviceRuntime};
use hubdeck_transport::DeviceTarget;

use crate::config::{Config, Settings};
use crate::session::SessionManager;

/// Current application screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    /// Device list
    #[default]
    Main,
    /// Controls of the focused device
    Device,
    Config,
    /// Device info page (topics, versions)
    Info,
    /// Device file browser
    Fsbr,
    /// Keypad, for either the app lock or a device PIN
    Pin,
    Test,
    Projects,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Main => "main",
            Screen::Device => "device",
            Screen::Config => "config",
            Screen::Info => "info",
            Screen::Fsbr => "fsbr",
            Screen::Pin => "pin",
            Screen::Test => "test",
            Screen::Projects => "projects",
        }
    }

    /// Screens that only make sense with a focused device
    pub fn needs_focus(&self) -> bool {
        matches!(self, Screen::Device | Screen::Info | Screen::Fsbr)
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the keypad is currently unlocking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinTarget {
    /// App-wide lock held at startup
    App,
    /// A device whose PIN has not been granted this run
    Device(DeviceId),
}

/// Deployment facts supplied by the host at launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    /// Served over TLS; plain WebSocket discovery is blocked
    pub secure_origin: bool,

    /// Address of the hub serving this client, on embedded deployments
    pub embedded_host: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryState {
    pub in_flight: bool,
    /// Number of the latest pass
    pub pass: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerState {
    pub connected: bool,
    /// Id of the newest link whose events are still honored
    pub link: u64,
    /// Reconnect attempts issued by the supervisor
    pub attempts: u64,
}

/// Kind of payload shown on the current screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Controls,
    Info,
    Fsbr,
    /// Anything else a focused device sent (cli output, value updates, ...)
    Other,
}

/// A device payload handed to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub device_id: DeviceId,
    pub kind: PayloadKind,
    pub body: Value,
}

/// One-shot outputs queued by handlers and drained by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Registry entry or runtime state of a device changed
    DeviceUpdated(DeviceId),
    /// Device removed from the registry
    DeviceRemoved(DeviceId),
    /// Offline device selected; the boundary should confirm deletion
    PromptDelete(DeviceId),
    ExportReady(String),
    Changelog,
    Payload(Payload),
}

/// Complete application state (the Model)
#[derive(Debug)]
pub struct AppState {
    pub screen: Screen,

    /// Navigation menu overlay
    pub menu_open: bool,

    /// Command-line overlay
    pub cli_open: bool,

    /// Connection-status banner
    pub banner: Option<String>,

    pub config: Config,

    /// Config edited since the CONFIG screen was entered
    pub config_changed: bool,

    /// Bumped whenever the config should be projected again
    pub config_revision: u64,

    pub devices: DeviceRegistry,

    /// Per-run device state, keyed by device id
    pub runtime: HashMap<DeviceId, DeviceRuntime>,

    pub session: SessionManager,

    pub discovery: DiscoveryState,

    pub broker: BrokerState,

    pub pin_target: Option<PinTarget>,

    /// Startup held on the app PIN
    pub app_locked: bool,

    /// Startup has completed; supervisors act only after this
    pub started: bool,

    /// Persisted version differed from this build's at load
    pub show_changelog: bool,

    pub host: HostContext,

    pub settings: Settings,

    pub notices: Vec<Notice>,

    quit: bool,
}

impl AppState {
    pub fn new(config: Config, devices: DeviceRegistry, settings: Settings, host: HostContext) -> Self {
        Self {
            screen: Screen::Main,
            menu_open: false,
            cli_open: false,
            banner: None,
            config,
            config_changed: false,
            config_revision: 0,
            devices,
            runtime: HashMap::new(),
            session: SessionManager::new(),
            discovery: DiscoveryState::default(),
            broker: BrokerState::default(),
            pin_target: None,
            app_locked: false,
            started: false,
            show_changelog: false,
            host,
            settings,
            notices: Vec::new(),
            quit: false,
        }
    }

    /// Connection kind currently believed to reach `id`
    pub fn conn(&self, id: &str) -> ConnectionKind {
        self.runtime.get(id).map(|r| r.conn).unwrap_or_default()
    }

    pub fn is_granted(&self, id: &str) -> bool {
        self.runtime.get(id).is_some_and(|r| r.granted)
    }

    /// Runtime entry for `id`, created on first observation
    pub fn runtime_mut(&mut self, id: &str) -> &mut DeviceRuntime {
        self.runtime.entry(id.to_string()).or_default()
    }

    /// Transport addressing for a registered device
    pub fn target_for(&self, id: &str) -> Option<DeviceTarget> {
        let device = self.devices.get(id)?;
        Some(DeviceTarget {
            id: id.to_string(),
            ip: device.ip.clone(),
            prefix: if device.prefix.is_empty() {
                self.config.prefix()
            } else {
                device.prefix.clone()
            },
            hub_id: self.config.hub_id(),
        })
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubdeck_core::Device;

    fn state() -> AppState {
        let mut devices = DeviceRegistry::new();
        devices.insert(
            "a1",
            Device {
                name: "Lamp".into(),
                ip: "192.168.1.20".into(),
                ..Default::default()
            },
        );
        AppState::new(
            Config::defaults("3f9c"),
            devices,
            Settings::default(),
            HostContext::default(),
        )
    }

    #[test]
    fn test_unobserved_device_is_offline_and_not_granted() {
        let state = state();
        assert_eq!(state.conn("a1"), ConnectionKind::None);
        assert!(!state.is_granted("a1"));
    }

    #[test]
    fn test_target_falls_back_to_config_prefix() {
        let target = state().target_for("a1").unwrap();
        assert_eq!(target.prefix, "MyDevices");
        assert_eq!(target.hub_id, "3f9c");
        assert_eq!(target.ip, "192.168.1.20");
        assert!(state().target_for("zz").is_none());
    }

    #[test]
    fn test_notices_drain_once() {
        let mut state = state();
        state.notify(Notice::Changelog);
        assert_eq!(state.take_notices(), vec![Notice::Changelog]);
        assert!(state.take_notices().is_empty());
    }
}

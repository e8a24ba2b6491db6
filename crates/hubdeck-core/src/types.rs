//! Core domain types: devices, connection kinds, per-run device state

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable device identifier as reported by the hub firmware
pub type DeviceId = String;

/// Transport currently believed to reach a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Not reachable (offline) as far as the last discovery pass knows
    #[default]
    None,
    Serial,
    Bluetooth,
    #[serde(rename = "ws")]
    WebSocket,
    Mqtt,
}

impl ConnectionKind {
    /// All reachable kinds, in discovery order
    pub const TRANSPORTS: [ConnectionKind; 4] = [
        ConnectionKind::Serial,
        ConnectionKind::Bluetooth,
        ConnectionKind::WebSocket,
        ConnectionKind::Mqtt,
    ];

    /// Short label used for logging and per-transport indicators
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionKind::None => "None",
            ConnectionKind::Serial => "Serial",
            ConnectionKind::Bluetooth => "BT",
            ConnectionKind::WebSocket => "WS",
            ConnectionKind::Mqtt => "MQTT",
        }
    }

    pub fn is_online(&self) -> bool {
        !matches!(self, ConnectionKind::None)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A hub device as persisted in the registry
///
/// Fields the firmware reports that this client does not interpret (widget
/// layout flags, module bitmasks, ...) are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub ip: String,

    /// Topic prefix the device listens on
    #[serde(default)]
    pub prefix: String,

    /// String hash of the device PIN, 0 when the device has none
    #[serde(rename = "PIN", default)]
    pub pin: i64,

    /// Firmware version, `owner/repo@x.y.z` for published projects
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub gzip: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn has_pin(&self) -> bool {
        self.pin != 0
    }

    /// IPv4 address if the device reported a usable one
    pub fn address(&self) -> Option<std::net::Ipv4Addr> {
        self.ip.parse().ok()
    }
}

/// Persisted device registry, keyed by device id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
}

/// What a merge did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Updated,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<DeviceId>, device: Device) -> Option<Device> {
        self.devices.insert(id.into(), device)
    }

    pub fn remove(&mut self, id: &str) -> Option<Device> {
        self.devices.remove(id)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &Device)> {
        self.devices.iter()
    }

    /// Merge a freshly reported device record into the registry.
    ///
    /// Reported fields overwrite the stored ones; stored `extra` keys the
    /// report does not mention survive.
    pub fn merge(&mut self, id: &str, reported: Device) -> MergeOutcome {
        match self.devices.get_mut(id) {
            Some(existing) => {
                let Device {
                    name,
                    ip,
                    prefix,
                    pin,
                    version,
                    gzip,
                    icon,
                    extra,
                } = reported;
                existing.name = name;
                existing.ip = ip;
                existing.prefix = prefix;
                existing.pin = pin;
                existing.version = version;
                existing.gzip = gzip;
                if icon.is_some() {
                    existing.icon = icon;
                }
                existing.extra.extend(extra);
                MergeOutcome::Updated
            }
            None => {
                self.devices.insert(id.to_string(), reported);
                MergeOutcome::Added
            }
        }
    }

    /// Whether any registered device was served from `host`
    pub fn has_ip(&self, host: &str) -> bool {
        self.devices.values().any(|d| d.ip == host)
    }
}

/// Per-run state of a device; never persisted
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceRuntime {
    /// Transport believed to reach the device right now
    pub conn: ConnectionKind,

    /// PIN satisfied during this run
    pub granted: bool,

    /// Last control descriptors the device sent (opaque)
    pub controls: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, ip: &str) -> Device {
        Device {
            name: name.to_string(),
            ip: ip.to_string(),
            prefix: "MyDevices".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_kind_default_is_none() {
        assert_eq!(ConnectionKind::default(), ConnectionKind::None);
        assert!(!ConnectionKind::None.is_online());
        assert!(ConnectionKind::Mqtt.is_online());
    }

    #[test]
    fn test_connection_kind_labels() {
        assert_eq!(ConnectionKind::WebSocket.to_string(), "WS");
        assert_eq!(ConnectionKind::Bluetooth.to_string(), "BT");
        assert_eq!(ConnectionKind::Mqtt.to_string(), "MQTT");
    }

    #[test]
    fn test_device_pin_zero_means_no_pin() {
        let mut d = device("lamp", "192.168.1.10");
        assert!(!d.has_pin());
        d.pin = 1509442;
        assert!(d.has_pin());
    }

    #[test]
    fn test_device_deserialize_keeps_unknown_fields() {
        let json = r#"{"name":"lamp","ip":"10.0.0.2","prefix":"MyDevices","PIN":0,
                       "version":"v1","gzip":true,"break_widgets":true}"#;
        let d: Device = serde_json::from_str(json).unwrap();
        assert_eq!(d.name, "lamp");
        assert!(d.gzip);
        assert_eq!(d.extra.get("break_widgets"), Some(&Value::Bool(true)));

        let back = serde_json::to_value(&d).unwrap();
        assert_eq!(back["break_widgets"], Value::Bool(true));
        assert_eq!(back["PIN"], Value::from(0));
    }

    #[test]
    fn test_registry_merge_adds_then_updates() {
        let mut reg = DeviceRegistry::new();
        assert_eq!(reg.merge("a1", device("lamp", "10.0.0.2")), MergeOutcome::Added);

        reg.get_mut("a1")
            .unwrap()
            .extra
            .insert("show_names".into(), Value::Bool(true));

        let outcome = reg.merge("a1", device("lamp v2", "10.0.0.3"));
        assert_eq!(outcome, MergeOutcome::Updated);

        let stored = reg.get("a1").unwrap();
        assert_eq!(stored.name, "lamp v2");
        assert_eq!(stored.ip, "10.0.0.3");
        assert_eq!(stored.extra.get("show_names"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_registry_roundtrips_as_plain_object() {
        let mut reg = DeviceRegistry::new();
        reg.insert("a1", device("lamp", "10.0.0.2"));

        let json = serde_json::to_string(&reg).unwrap();
        assert!(json.starts_with("{\"a1\":"));

        let back: DeviceRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reg);
    }

    #[test]
    fn test_registry_has_ip() {
        let mut reg = DeviceRegistry::new();
        reg.insert("a1", device("lamp", "10.0.0.2"));
        assert!(reg.has_ip("10.0.0.2"));
        assert!(!reg.has_ip("10.0.0.9"));
    }
}

//! User preference map
//!
//! The config is a flat JSON object. Keys this build knows about have typed
//! getters that fall back to the compiled default when a value is missing or
//! of the wrong type; keys it does not know about are carried verbatim so a
//! newer client's settings survive a round trip through an older one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version written into `config.version`
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Known config keys
pub mod keys {
    pub const PREFIX: &str = "prefix";
    pub const USE_WS: &str = "use_ws";
    pub const USE_HOOK: &str = "use_hook";
    pub const CLIENT_IP: &str = "client_ip";
    pub const NETMASK: &str = "netmask";
    pub const USE_BT: &str = "use_bt";
    pub const USE_SERIAL: &str = "use_serial";
    pub const USE_MQTT: &str = "use_mqtt";
    pub const MQ_HOST: &str = "mq_host";
    pub const MQ_PORT: &str = "mq_port";
    pub const MQ_LOGIN: &str = "mq_login";
    pub const MQ_PASS: &str = "mq_pass";
    pub const USE_PIN: &str = "use_pin";
    pub const HUB_PIN: &str = "hub_pin";
    pub const HUB_ID: &str = "hub_id";
    pub const UI_WIDTH: &str = "ui_width";
    pub const THEME: &str = "theme";
    pub const MAINCOLOR: &str = "maincolor";
    pub const FONT: &str = "font";
    pub const VERSION: &str = "version";
    pub const CHECK_UPD: &str = "check_upd";

    /// Keys whose change requires the broker link to be rebuilt
    pub const BROKER_KEYS: [&str; 5] = [PREFIX, MQ_HOST, MQ_PORT, MQ_LOGIN, MQ_PASS];
}

/// Flat key-value preference set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(Map<String, Value>);

impl Config {
    /// Compiled default schema for this build
    pub fn defaults(hub_id: &str) -> Self {
        Self::defaults_with_version(hub_id, APP_VERSION)
    }

    /// Default schema stamped with an explicit version
    pub fn defaults_with_version(hub_id: &str, version: &str) -> Self {
        let mut map = Map::new();
        map.insert(keys::PREFIX.into(), "MyDevices".into());
        map.insert(keys::USE_WS.into(), false.into());
        map.insert(keys::USE_HOOK.into(), true.into());
        map.insert(keys::CLIENT_IP.into(), "192.168.1.1".into());
        map.insert(keys::NETMASK.into(), 24.into());
        map.insert(keys::USE_BT.into(), false.into());
        map.insert(keys::USE_SERIAL.into(), false.into());
        map.insert(keys::USE_MQTT.into(), false.into());
        map.insert(keys::MQ_HOST.into(), "test.mosquitto.org".into());
        map.insert(keys::MQ_PORT.into(), "8081".into());
        map.insert(keys::MQ_LOGIN.into(), "".into());
        map.insert(keys::MQ_PASS.into(), "".into());
        map.insert(keys::USE_PIN.into(), false.into());
        map.insert(keys::HUB_PIN.into(), "".into());
        map.insert(keys::HUB_ID.into(), hub_id.into());
        map.insert(keys::UI_WIDTH.into(), 450.into());
        map.insert(keys::THEME.into(), "DARK".into());
        map.insert(keys::MAINCOLOR.into(), "GREEN".into());
        map.insert(keys::FONT.into(), "monospace".into());
        map.insert(keys::VERSION.into(), version.into());
        map.insert(keys::CHECK_UPD.into(), true.into());
        Self(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a key, returning whether the stored value changed
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.0.get(&key) == Some(&value) {
            return false;
        }
        self.0.insert(key, value);
        true
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Every entry except `version`, as handed to the presentation layer
    pub fn presentation(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != keys::VERSION)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ─────────────────────────────────────────────────────────
    // Typed getters
    // ─────────────────────────────────────────────────────────

    fn flag(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn text(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn prefix(&self) -> String {
        self.text(keys::PREFIX, "MyDevices")
    }

    pub fn use_ws(&self) -> bool {
        self.flag(keys::USE_WS, false)
    }

    pub fn use_mqtt(&self) -> bool {
        self.flag(keys::USE_MQTT, false)
    }

    pub fn use_bt(&self) -> bool {
        self.flag(keys::USE_BT, false)
    }

    pub fn use_serial(&self) -> bool {
        self.flag(keys::USE_SERIAL, false)
    }

    pub fn use_pin(&self) -> bool {
        self.flag(keys::USE_PIN, false)
    }

    pub fn check_updates(&self) -> bool {
        self.flag(keys::CHECK_UPD, true)
    }

    pub fn client_ip(&self) -> String {
        self.text(keys::CLIENT_IP, "192.168.1.1")
    }

    /// Netmask bits; accepts a number or a numeric string
    pub fn netmask(&self) -> u8 {
        match self.0.get(keys::NETMASK) {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .unwrap_or(24)
    }

    pub fn mq_host(&self) -> String {
        self.text(keys::MQ_HOST, "test.mosquitto.org")
    }

    /// Broker port; `None` when the stored value is not a valid port
    pub fn mq_port(&self) -> Option<u16> {
        self.text(keys::MQ_PORT, "8081").trim().parse().ok()
    }

    pub fn mq_login(&self) -> String {
        self.text(keys::MQ_LOGIN, "")
    }

    pub fn mq_pass(&self) -> String {
        self.text(keys::MQ_PASS, "")
    }

    pub fn hub_id(&self) -> String {
        self.text(keys::HUB_ID, "")
    }

    /// Stored app PIN hash, 0 when none is set
    pub fn hub_pin_hash(&self) -> i64 {
        match self.0.get(keys::HUB_PIN) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.0.get(keys::VERSION).and_then(Value::as_str)
    }

    /// Rewrite a numeric `hub_id` (older clients) as its hex string.
    ///
    /// Returns whether anything changed.
    pub fn normalize_hub_id(&mut self) -> bool {
        let Some(Value::Number(n)) = self.0.get(keys::HUB_ID) else {
            return false;
        };
        let Some(id) = n.as_i64() else {
            return false;
        };
        let hex = if id < 0 {
            format!("-{:x}", id.unsigned_abs())
        } else {
            format!("{id:x}")
        };
        self.0.insert(keys::HUB_ID.into(), Value::String(hex));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_cover_schema() {
        let cfg = Config::defaults("3f9c");
        assert_eq!(cfg.prefix(), "MyDevices");
        assert!(!cfg.use_ws());
        assert!(!cfg.use_mqtt());
        assert_eq!(cfg.mq_host(), "test.mosquitto.org");
        assert_eq!(cfg.mq_port(), Some(8081));
        assert_eq!(cfg.netmask(), 24);
        assert_eq!(cfg.hub_id(), "3f9c");
        assert_eq!(cfg.version(), Some(APP_VERSION));
        assert_eq!(cfg.keys().count(), 21);
    }

    #[test]
    fn test_getters_fall_back_on_wrong_types() {
        let cfg = Config::from_map(
            json!({"use_mqtt": "yes", "netmask": "16", "mq_port": "nope"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(!cfg.use_mqtt());
        assert_eq!(cfg.netmask(), 16);
        assert_eq!(cfg.mq_port(), None);
        assert_eq!(cfg.prefix(), "MyDevices");
    }

    #[test]
    fn test_set_reports_change() {
        let mut cfg = Config::defaults("3f9c");
        assert!(!cfg.set(keys::USE_WS, json!(false)));
        assert!(cfg.set(keys::USE_WS, json!(true)));
        assert!(cfg.use_ws());
    }

    #[test]
    fn test_presentation_excludes_version_only() {
        let mut cfg = Config::defaults("3f9c");
        cfg.set("future_key", json!({"nested": 1}));
        let shown = cfg.presentation();
        assert!(!shown.contains_key(keys::VERSION));
        assert_eq!(shown.len(), cfg.keys().count() - 1);
        assert_eq!(shown["future_key"], json!({"nested": 1}));
    }

    #[test]
    fn test_numeric_hub_id_is_normalized_to_hex() {
        let mut cfg = Config::defaults("x");
        cfg.set(keys::HUB_ID, json!(255));
        assert!(cfg.normalize_hub_id());
        assert_eq!(cfg.hub_id(), "ff");
        assert!(!cfg.normalize_hub_id());

        cfg.set(keys::HUB_ID, json!(-26));
        assert!(cfg.normalize_hub_id());
        assert_eq!(cfg.hub_id(), "-1a");
    }

    #[test]
    fn test_hub_pin_hash_parses_number_or_string() {
        let mut cfg = Config::defaults("x");
        assert_eq!(cfg.hub_pin_hash(), 0);
        cfg.set(keys::HUB_PIN, json!("1509442"));
        assert_eq!(cfg.hub_pin_hash(), 1509442);
        cfg.set(keys::HUB_PIN, json!(1509442));
        assert_eq!(cfg.hub_pin_hash(), 1509442);
    }
}

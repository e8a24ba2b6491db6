//! Headless mode - NDJSON event output driven by stdin commands
//!
//! Engine events are written to stdout as NDJSON (newline-delimited JSON),
//! one event per line. Each event has an "event" field naming its type.
//!
//! # Example Output
//!
//! ```json
//! {"event":"config_applied","entries":{"prefix":"MyDevices","use_ws":true},"timestamp":1704700001000}
//! {"event":"device_updated","device_id":"a1b2","name":"Lamp","ip":"192.168.1.20","conn":"WS","has_pin":false,"version":"1.2","timestamp":1704700002000}
//! {"event":"screen_changed","screen":"device","focused":"a1b2","info_topics":null,"timestamp":1704700003000}
//! ```

pub mod runner;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};
use tracing::error;

use hubdeck_app::{EngineEvent, PayloadKind};
use hubdeck_core::InfoTopics;

/// The four topic strings of the INFO screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSet {
    pub set: String,
    pub read: String,
    pub get: String,
    pub status: String,
}

impl From<&InfoTopics> for TopicSet {
    fn from(topics: &InfoTopics) -> Self {
        Self {
            set: topics.set.clone(),
            read: topics.read.clone(),
            get: topics.get.clone(),
            status: topics.status.clone(),
        }
    }
}

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    ScreenChanged {
        screen: String,
        focused: Option<String>,
        info_topics: Option<TopicSet>,
        timestamp: i64,
    },

    DeviceUpdated {
        device_id: String,
        name: String,
        ip: String,
        /// Connection kind label (`None`, `WS`, `MQTT`, ...)
        conn: String,
        has_pin: bool,
        version: String,
        timestamp: i64,
    },

    DeviceRemoved { device_id: String, timestamp: i64 },

    /// Offline device selected; the caller should confirm with `delete <id>`
    PromptDelete { device_id: String, timestamp: i64 },

    SessionOpened {
        device_id: String,
        kind: String,
        timestamp: i64,
    },

    SessionClosed { device_id: String, timestamp: i64 },

    ConfigApplied {
        entries: Map<String, Value>,
        timestamp: i64,
    },

    ExportReady { blob: String, timestamp: i64 },

    Banner {
        text: Option<String>,
        timestamp: i64,
    },

    Changelog { version: String, timestamp: i64 },

    Payload {
        device_id: String,
        kind: PayloadKind,
        body: Value,
        timestamp: i64,
    },

    /// Bad stdin command and similar non-fatal problems
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }

    /// Headless form of an engine event
    pub fn from_engine(event: &EngineEvent) -> Self {
        let timestamp = Self::now();
        match event {
            EngineEvent::ScreenChanged {
                screen,
                focused,
                info_topics,
            } => Self::ScreenChanged {
                screen: screen.name().to_string(),
                focused: focused.clone(),
                info_topics: info_topics.as_ref().map(TopicSet::from),
                timestamp,
            },
            EngineEvent::Banner { text } => Self::Banner {
                text: text.clone(),
                timestamp,
            },
            EngineEvent::DeviceUpdated { id, device, conn } => Self::DeviceUpdated {
                device_id: id.clone(),
                name: device.name.clone(),
                ip: device.ip.clone(),
                conn: conn.label().to_string(),
                has_pin: device.has_pin(),
                version: device.version.clone(),
                timestamp,
            },
            EngineEvent::DeviceRemoved { id } => Self::DeviceRemoved {
                device_id: id.clone(),
                timestamp,
            },
            EngineEvent::PromptDelete { id } => Self::PromptDelete {
                device_id: id.clone(),
                timestamp,
            },
            EngineEvent::SessionOpened { device_id, kind } => Self::SessionOpened {
                device_id: device_id.clone(),
                kind: kind.label().to_string(),
                timestamp,
            },
            EngineEvent::SessionClosed { device_id } => Self::SessionClosed {
                device_id: device_id.clone(),
                timestamp,
            },
            EngineEvent::Payload(payload) => Self::Payload {
                device_id: payload.device_id.clone(),
                kind: payload.kind,
                body: payload.body.clone(),
                timestamp,
            },
            EngineEvent::ConfigApplied { entries } => Self::ConfigApplied {
                entries: entries.clone(),
                timestamp,
            },
            EngineEvent::ExportReady { blob } => Self::ExportReady {
                blob: blob.clone(),
                timestamp,
            },
            EngineEvent::Changelog { version } => Self::Changelog {
                version: version.clone(),
                timestamp,
            },
            EngineEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubdeck_app::Screen;
    use hubdeck_core::{ConnectionKind, Device};

    #[test]
    fn test_screen_changed_serializes_with_tag() {
        let event = HeadlessEvent::from_engine(&EngineEvent::ScreenChanged {
            screen: Screen::Info,
            focused: Some("a1b2".into()),
            info_topics: Some(InfoTopics::for_device("MyDevices", "a1b2")),
        });
        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "screen_changed");
        assert_eq!(json["screen"], "info");
        assert_eq!(json["focused"], "a1b2");
        assert_eq!(json["info_topics"]["status"], "MyDevices/hub/a1b2/status");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_device_updated_carries_connection_label() {
        let event = HeadlessEvent::from_engine(&EngineEvent::DeviceUpdated {
            id: "a1b2".into(),
            device: Device {
                name: "Lamp".into(),
                pin: 1509442,
                ..Default::default()
            },
            conn: ConnectionKind::Mqtt,
        });
        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "device_updated");
        assert_eq!(json["conn"], "MQTT");
        assert_eq!(json["has_pin"], true);
    }

    #[test]
    fn test_payload_kind_is_snake_case() {
        let event = HeadlessEvent::from_engine(&EngineEvent::Payload(hubdeck_app::Payload {
            device_id: "a1b2".into(),
            kind: PayloadKind::Fsbr,
            body: serde_json::json!({"files": []}),
        }));
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "fsbr");
        assert_eq!(json["body"]["files"], serde_json::json!([]));
    }
}

//! Domain events emitted by the Engine for external consumers
//!
//! Events are broadcast after each message processing cycle via
//! `Engine::subscribe()`. The headless runner turns them into NDJSON lines;
//! any other presentation layer would subscribe the same way.

use serde_json::{Map, Value};

use hubdeck_core::{ConnectionKind, Device, DeviceId, InfoTopics};

use crate::state::{Payload, Screen};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    // ─────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────
    /// Current screen or focused device changed
    ScreenChanged {
        screen: Screen,
        focused: Option<DeviceId>,
        /// Topic strings of the focused device, on the INFO screen only
        info_topics: Option<InfoTopics>,
    },

    /// Connection banner set or cleared
    Banner { text: Option<String> },

    // ─────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────
    /// Registry entry or connection kind of a device changed
    DeviceUpdated {
        id: DeviceId,
        device: Device,
        conn: ConnectionKind,
    },

    DeviceRemoved { id: DeviceId },

    /// An offline device was selected; ask whether to delete it
    PromptDelete { id: DeviceId },

    // ─────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────
    SessionOpened {
        device_id: DeviceId,
        kind: ConnectionKind,
    },

    SessionClosed { device_id: DeviceId },

    /// Device payload for the current screen
    Payload(Payload),

    // ─────────────────────────────────────────────────────────
    // Config
    // ─────────────────────────────────────────────────────────
    /// Every non-version config entry, for the presentation layer to apply
    ConfigApplied { entries: Map<String, Value> },

    ExportReady { blob: String },

    /// Stored version differed from this build's
    Changelog { version: String },

    // ─────────────────────────────────────────────────────────
    // Engine Lifecycle
    // ─────────────────────────────────────────────────────────
    Shutdown,
}

impl EngineEvent {
    /// Short label, used as the `event` tag of headless output
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::ScreenChanged { .. } => "screen_changed",
            EngineEvent::Banner { .. } => "banner",
            EngineEvent::DeviceUpdated { .. } => "device_updated",
            EngineEvent::DeviceRemoved { .. } => "device_removed",
            EngineEvent::PromptDelete { .. } => "prompt_delete",
            EngineEvent::SessionOpened { .. } => "session_opened",
            EngineEvent::SessionClosed { .. } => "session_closed",
            EngineEvent::Payload(_) => "payload",
            EngineEvent::ConfigApplied { .. } => "config_applied",
            EngineEvent::ExportReady { .. } => "export_ready",
            EngineEvent::Changelog { .. } => "changelog",
            EngineEvent::Shutdown => "shutdown",
        }
    }
}

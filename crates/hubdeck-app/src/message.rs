//! Message types for the application (TEA pattern)

use serde_json::Value;

use hubdeck_core::{ConnectionKind, DeviceId};
use hubdeck_transport::TransportEvent;

/// All possible messages/actions in the application
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────
    /// First message after the engine is built
    Startup,

    /// Startup continues past the app lock (or there was none)
    StartupUnlocked,

    /// Quit (stdin command, signal handler)
    Quit,

    // ─────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────
    Back,
    Refresh,
    ToggleMenu,
    OpenInfo,
    OpenFsbr,
    /// Enter the CONFIG screen, or leave it if already there
    OpenConfig,
    OpenTest,
    OpenProjects,
    ToggleCli,

    // ─────────────────────────────────────────────────────────
    // Devices & sessions
    // ─────────────────────────────────────────────────────────
    /// User picked a device from the list
    SelectDevice { id: DeviceId },

    /// Open a session on a device
    OpenDevice { id: DeviceId },

    /// Close the focused session, if any
    CloseSession,

    /// Digits entered on the keypad
    EnterPin { digits: String },

    Discover,
    DiscoverAll,

    DeleteDevice { id: DeviceId },
    ClearDevices,

    /// Send one line to the focused device's CLI
    SendCli { text: String },

    // ─────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────
    SetConfig { key: String, value: Value },
    /// Persist the current config
    SaveConfig,
    Export,
    Import { blob: String },

    // ─────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────
    /// Broker reconnect supervisor tick (every 5 s)
    ReconnectTick,

    /// Liveness supervisor tick for session `generation`
    LivenessTick { generation: u64 },

    /// Discovery window of pass `pass` closed
    DiscoveryWindowElapsed { pass: u64 },

    // ─────────────────────────────────────────────────────────
    // Transport results
    // ─────────────────────────────────────────────────────────
    Transport(TransportEvent),

    /// Outcome of connect + focus for session `generation`
    SessionLinkResult {
        generation: u64,
        result: Result<(), String>,
    },

    /// A transport command failed; informational only
    TransportFailed {
        kind: ConnectionKind,
        operation: &'static str,
        error: String,
    },
}

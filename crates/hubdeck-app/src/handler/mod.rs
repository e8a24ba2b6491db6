//! Handler module - TEA update function and event handlers
//!
//! Organized into submodules:
//! - `update`: Main update() function and message dispatch
//! - `navigation`: Screen transitions, back/refresh, menu and CLI overlay
//! - `session`: Open/close, PIN gate, liveness, device deletion
//! - `discovery`: Discovery passes and their windows
//! - `config`: Config edits, broker link control, export/import
//! - `transport`: Events reported by transports

pub(crate) mod config;
pub(crate) mod discovery;
pub(crate) mod navigation;
pub(crate) mod session;
pub(crate) mod transport;
pub(crate) mod update;


use std::time::Duration;

use hubdeck_core::{ConnectionKind, DeviceRegistry};
use hubdeck_transport::{BrokerOptions, DeviceTarget, DiscoverRequest, Query};

use crate::config::Config;
use crate::message::Message;

// Re-export main entry point
pub use update::update;

/// Actions that the event loop should perform after update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Issue a discovery request on each of `kinds` and close the window
    /// of pass `pass` after `window`
    Discover {
        request: DiscoverRequest,
        kinds: Vec<ConnectionKind>,
        pass: u64,
        window: Duration,
    },

    /// Connect and focus, then report `SessionLinkResult`; arms the
    /// liveness supervisor for `generation`
    OpenSession {
        target: DeviceTarget,
        kind: ConnectionKind,
        generation: u64,
        liveness: Duration,
    },

    /// Unfocus and disconnect; disarms the liveness supervisor
    CloseSession {
        target: DeviceTarget,
        kind: ConnectionKind,
    },

    /// Ask the focused device for a payload
    QueryDevice {
        target: DeviceTarget,
        kind: ConnectionKind,
        query: Query,
    },

    /// (Re)start the broker link
    StartBroker { options: BrokerOptions },

    StopBroker,

    /// Write the given values to storage
    Persist {
        config: Option<Config>,
        devices: Option<DeviceRegistry>,
    },
}

/// Result of processing a message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Optional follow-up message to process
    pub message: Option<Message>,
    /// Optional action for the event loop to perform
    pub action: Option<UpdateAction>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(msg: Message) -> Self {
        Self {
            message: Some(msg),
            action: None,
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            message: None,
            action: Some(action),
        }
    }

    /// Perform `action` (if any), then process `msg`
    pub fn then(action: Option<UpdateAction>, msg: Message) -> Self {
        Self {
            message: Some(msg),
            action,
        }
    }

    pub fn maybe_action(action: Option<UpdateAction>) -> Self {
        Self {
            message: None,
            action,
        }
    }
}

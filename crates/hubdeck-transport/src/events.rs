//! Events reported by transports back to the orchestrator

use hubdeck_core::{ConnectionKind, DeviceId, Inbound};

/// Something a transport observed
///
/// Transports never fail loudly: a dead socket or broker becomes one of these
/// events and the orchestrator decides what, if anything, to show.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A classified message from a device (discover reply, controls, ...)
    Received {
        kind: ConnectionKind,
        message: Inbound,
    },

    /// A per-device socket closed without being asked to
    SocketClosed {
        kind: ConnectionKind,
        device_id: DeviceId,
    },

    /// Broker link `link` finished its handshake
    BrokerConnected { link: u64 },

    /// Broker link `link` went down; its event loop has ended
    BrokerDisconnected { link: u64, reason: String },
}

impl TransportEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Received { .. } => "Received",
            TransportEvent::SocketClosed { .. } => "SocketClosed",
            TransportEvent::BrokerConnected { .. } => "BrokerConnected",
            TransportEvent::BrokerDisconnected { .. } => "BrokerDisconnected",
        }
    }
}

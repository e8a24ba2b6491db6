//! # hubdeck-transport - Device Transports
//!
//! The capability surface every connection kind implements, and the four
//! implementations of it.
//!
//! Depends on [`hubdeck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Capability
//! - [`TransportAdapter`] - connect / disconnect / focus / unfocus / discover / query
//! - [`DeviceTarget`], [`DiscoverRequest`], [`DiscoverScope`], [`Query`]
//!
//! ### Adapters
//! - [`WebSocketAdapter`] - one socket per focused device, probe-based discovery
//! - [`MqttAdapter`] - one shared broker link, publishes for everything else
//! - [`UnsupportedAdapter`] - Bluetooth and Serial, mechanics not built here
//! - [`AdapterSet`] - tagged dispatch from [`ConnectionKind`](hubdeck_core::ConnectionKind)
//!
//! ### Events
//! - [`TransportEvent`] - messages, socket closes, broker up/down

pub mod adapter;
pub mod events;
pub mod mqtt;
pub mod set;
pub mod subnet;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod unsupported;
pub mod websocket;

pub use adapter::{
    DeviceTarget, DiscoverRequest, DiscoverScope, LocalTransportAdapter, Query, TransportAdapter,
};
pub use events::TransportEvent;
pub use mqtt::{BrokerOptions, BrokerTransport, MqttAdapter};
pub use set::{Adapter, AdapterSet};
pub use subnet::Subnet;
pub use unsupported::UnsupportedAdapter;
pub use websocket::{WebSocketAdapter, WsOptions};

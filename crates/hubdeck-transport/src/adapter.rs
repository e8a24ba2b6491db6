//! Transport capability surface
//!
//! Every connection kind implements [`TransportAdapter`]. Adapters are cheap
//! clonable handles; the orchestrator drives them from a single sequential
//! worker so a `close` always completes before the next `open` starts.

use std::net::Ipv4Addr;

use hubdeck_core::prelude::*;
use hubdeck_core::topics::{self, DeviceCommand};
use hubdeck_core::{ConnectionKind, DeviceId};

use crate::subnet::Subnet;

/// Addressing needed to reach one device from this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub id: DeviceId,
    pub ip: String,
    /// Topic prefix the device listens on
    pub prefix: String,
    /// This client's hub id, used as the reply address
    pub hub_id: String,
}

/// How wide a discovery request reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverScope {
    /// Devices already in the registry (plus an embedded host)
    Nearby,
    /// Everything the transport can broadcast to
    All,
}

/// One discovery request, fanned out to every eligible adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub scope: DiscoverScope,
    pub prefix: String,
    pub hub_id: String,
    /// Addresses probed directly by local transports
    pub known_hosts: Vec<Ipv4Addr>,
    /// Network swept by local transports when `scope` is `All`
    pub subnet: Option<Subnet>,
}

/// A payload request sent to an open device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Re-send focus; the device answers with its controls
    Focus,
    Info,
    Fsbr,
    Ping,
    /// One command line for the device CLI
    Cli(String),
}

/// Transport capability implemented once per connection kind
#[trait_variant::make(TransportAdapter: Send)]
pub trait LocalTransportAdapter {
    /// Connection kind this adapter serves
    fn kind(&self) -> ConnectionKind;

    /// Establish whatever per-device link the transport needs
    async fn connect(&self, target: &DeviceTarget) -> Result<()>;

    /// Tear down the per-device link; a missing link is not an error
    async fn disconnect(&self, target: &DeviceTarget) -> Result<()>;

    /// Tell the device it is now the viewed target
    async fn send_focus(&self, target: &DeviceTarget) -> Result<()>;

    /// Tell the device it is no longer viewed
    async fn send_unfocus(&self, target: &DeviceTarget) -> Result<()>;

    /// Issue a discovery request; replies arrive later as transport events
    async fn discover(&self, request: &DiscoverRequest) -> Result<()>;

    /// Ask an open device for a payload; the reply arrives as an event
    async fn query_state(&self, target: &DeviceTarget, query: &Query) -> Result<()>;
}

impl Query {
    /// Device command this query maps to
    pub fn command(&self) -> DeviceCommand {
        match self {
            Query::Focus => DeviceCommand::Focus,
            Query::Info => DeviceCommand::Info,
            Query::Fsbr => DeviceCommand::Fsbr,
            Query::Ping => DeviceCommand::Ping,
            Query::Cli(_) => DeviceCommand::Cli,
        }
    }
}

impl DeviceTarget {
    /// Command string addressed to this device
    pub fn command(&self, cmd: DeviceCommand) -> String {
        topics::command(&self.prefix, &self.id, &self.hub_id, cmd)
    }

    /// Command string plus its value, if the query carries one
    ///
    /// `(topic, value)`: the CLI line travels as `{topic}/cli` with the line as
    /// value, every other query is a bare command.
    pub fn query(&self, query: &Query) -> (String, Option<String>) {
        match query {
            Query::Cli(line) => (
                topics::named_command(&self.prefix, &self.id, &self.hub_id, DeviceCommand::Cli, "cli"),
                Some(line.clone()),
            ),
            other => (self.command(other.command()), None),
        }
    }
}

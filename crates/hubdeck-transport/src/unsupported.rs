//! Bluetooth and Serial adapters
//!
//! Both kinds are recognized connection kinds, but their link mechanics live
//! outside this crate. Every operation reports [`Error::Unsupported`] so an
//! integration can tell "not built here" apart from "silently did nothing".

use hubdeck_core::prelude::*;
use hubdeck_core::ConnectionKind;

use crate::adapter::{DeviceTarget, DiscoverRequest, Query, TransportAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedAdapter {
    kind: ConnectionKind,
}

impl UnsupportedAdapter {
    pub fn bluetooth() -> Self {
        Self {
            kind: ConnectionKind::Bluetooth,
        }
    }

    pub fn serial() -> Self {
        Self {
            kind: ConnectionKind::Serial,
        }
    }
}

impl TransportAdapter for UnsupportedAdapter {
    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn connect(&self, _target: &DeviceTarget) -> Result<()> {
        Err(Error::unsupported(self.kind, "connect"))
    }

    async fn disconnect(&self, _target: &DeviceTarget) -> Result<()> {
        Err(Error::unsupported(self.kind, "disconnect"))
    }

    async fn send_focus(&self, _target: &DeviceTarget) -> Result<()> {
        Err(Error::unsupported(self.kind, "send_focus"))
    }

    async fn send_unfocus(&self, _target: &DeviceTarget) -> Result<()> {
        Err(Error::unsupported(self.kind, "send_unfocus"))
    }

    async fn discover(&self, _request: &DiscoverRequest) -> Result<()> {
        Err(Error::unsupported(self.kind, "discover"))
    }

    async fn query_state(&self, _target: &DeviceTarget, _query: &Query) -> Result<()> {
        Err(Error::unsupported(self.kind, "query_state"))
    }
}

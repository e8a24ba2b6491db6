//! Tagged dispatch from a connection kind to its adapter

use tokio::sync::mpsc;

use hubdeck_core::prelude::*;
use hubdeck_core::ConnectionKind;

use crate::adapter::{DeviceTarget, DiscoverRequest, Query, TransportAdapter};
use crate::events::TransportEvent;
use crate::mqtt::{BrokerOptions, MqttAdapter};
use crate::unsupported::UnsupportedAdapter;
use crate::websocket::{WebSocketAdapter, WsOptions};

#[cfg(any(test, feature = "test-helpers"))]
use crate::test_utils::RecordingAdapter;

/// One adapter of any kind
#[derive(Debug, Clone)]
pub enum Adapter {
    WebSocket(WebSocketAdapter),
    Mqtt(MqttAdapter),
    Unsupported(UnsupportedAdapter),
    #[cfg(any(test, feature = "test-helpers"))]
    Recording(RecordingAdapter),
}

macro_rules! dispatch {
    ($self:ident, $a:ident => $call:expr) => {
        match $self {
            Adapter::WebSocket($a) => $call,
            Adapter::Mqtt($a) => $call,
            Adapter::Unsupported($a) => $call,
            #[cfg(any(test, feature = "test-helpers"))]
            Adapter::Recording($a) => $call,
        }
    };
}

impl TransportAdapter for Adapter {
    fn kind(&self) -> ConnectionKind {
        dispatch!(self, a => a.kind())
    }

    async fn connect(&self, target: &DeviceTarget) -> Result<()> {
        dispatch!(self, a => a.connect(target).await)
    }

    async fn disconnect(&self, target: &DeviceTarget) -> Result<()> {
        dispatch!(self, a => a.disconnect(target).await)
    }

    async fn send_focus(&self, target: &DeviceTarget) -> Result<()> {
        dispatch!(self, a => a.send_focus(target).await)
    }

    async fn send_unfocus(&self, target: &DeviceTarget) -> Result<()> {
        dispatch!(self, a => a.send_unfocus(target).await)
    }

    async fn discover(&self, request: &DiscoverRequest) -> Result<()> {
        dispatch!(self, a => a.discover(request).await)
    }

    async fn query_state(&self, target: &DeviceTarget, query: &Query) -> Result<()> {
        dispatch!(self, a => a.query_state(target, query).await)
    }
}

/// The four adapters, one per reachable connection kind
#[derive(Debug, Clone)]
pub struct AdapterSet {
    websocket: Adapter,
    mqtt: Adapter,
    bluetooth: Adapter,
    serial: Adapter,
}

impl AdapterSet {
    /// Production set: real WebSocket and MQTT, unsupported Bluetooth/Serial
    pub fn new(ws_options: WsOptions, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            websocket: Adapter::WebSocket(WebSocketAdapter::new(ws_options, events.clone())),
            mqtt: Adapter::Mqtt(MqttAdapter::new(events)),
            bluetooth: Adapter::Unsupported(UnsupportedAdapter::bluetooth()),
            serial: Adapter::Unsupported(UnsupportedAdapter::serial()),
        }
    }

    /// Build from explicit adapters (used by test harnesses)
    pub fn from_adapters(websocket: Adapter, mqtt: Adapter, bluetooth: Adapter, serial: Adapter) -> Self {
        Self {
            websocket,
            mqtt,
            bluetooth,
            serial,
        }
    }

    /// Adapter for `kind`; `None` has no adapter
    pub fn get(&self, kind: ConnectionKind) -> Option<&Adapter> {
        match kind {
            ConnectionKind::None => None,
            ConnectionKind::WebSocket => Some(&self.websocket),
            ConnectionKind::Mqtt => Some(&self.mqtt),
            ConnectionKind::Bluetooth => Some(&self.bluetooth),
            ConnectionKind::Serial => Some(&self.serial),
        }
    }

    /// (Re)start the broker link; returns the link id
    pub async fn start_broker(&self, options: &BrokerOptions) -> Option<u64> {
        match &self.mqtt {
            Adapter::Mqtt(mqtt) => Some(mqtt.start(options).await),
            #[cfg(any(test, feature = "test-helpers"))]
            Adapter::Recording(recorder) => Some(recorder.start_broker().await),
            _ => None,
        }
    }

    pub async fn stop_broker(&self) {
        match &self.mqtt {
            Adapter::Mqtt(mqtt) => mqtt.stop().await,
            #[cfg(any(test, feature = "test-helpers"))]
            Adapter::Recording(recorder) => recorder.stop_broker(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_kind_has_no_adapter() {
        let (tx, _rx) = mpsc::channel(8);
        let set = AdapterSet::new(WsOptions::default(), tx);
        assert!(set.get(ConnectionKind::None).is_none());
        for kind in ConnectionKind::TRANSPORTS {
            assert_eq!(set.get(kind).map(|a| a.kind()), Some(kind));
        }
    }

    #[tokio::test]
    async fn test_bluetooth_dispatch_is_unsupported() {
        let (tx, _rx) = mpsc::channel(8);
        let set = AdapterSet::new(WsOptions::default(), tx);
        let target = DeviceTarget {
            id: "a1b2".into(),
            ip: String::new(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
        };
        let err = set
            .get(ConnectionKind::Bluetooth)
            .unwrap()
            .connect(&target)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }
}

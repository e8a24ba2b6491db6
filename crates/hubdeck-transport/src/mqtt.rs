//! MQTT transport over one shared broker link
//!
//! The link is independent of which device is focused: focus, unfocus and
//! queries are plain publishes on per-device topics. When the link drops its
//! event loop ends and reports [`TransportEvent::BrokerDisconnected`];
//! reconnecting is the orchestrator's job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use hubdeck_core::prelude::*;
use hubdeck_core::topics::{self, DeviceCommand, HubTopic};
use hubdeck_core::{parse_inbound, ConnectionKind};

use crate::adapter::{DeviceTarget, DiscoverRequest, Query, TransportAdapter};
use crate::events::TransportEvent;

const KIND: ConnectionKind = ConnectionKind::Mqtt;

/// Request queue depth between the client handle and its event loop
const REQUEST_CAPACITY: usize = 32;

/// How the broker is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerTransport {
    /// MQTT over TLS WebSocket (public brokers, port 8081 on mosquitto.org)
    #[default]
    Wss,
    /// MQTT over plain WebSocket
    Ws,
    /// Raw MQTT over TCP
    Tcp,
}

/// Everything needed to bring up the broker link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub pass: String,
    /// Topic prefix subscribed under `{prefix}/hub/#`
    pub prefix: String,
    pub hub_id: String,
    pub transport: BrokerTransport,
    pub keep_alive: Duration,
}

impl BrokerOptions {
    /// Broker address as rumqttc expects it for the selected transport
    pub fn broker_addr(&self) -> String {
        match self.transport {
            BrokerTransport::Wss => format!("wss://{}:{}/mqtt", self.host, self.port),
            BrokerTransport::Ws => format!("ws://{}:{}/mqtt", self.host, self.port),
            BrokerTransport::Tcp => self.host.clone(),
        }
    }

    fn client_id(&self) -> String {
        format!("hubdeck-{}", self.hub_id)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id(), self.broker_addr(), self.port);
        match self.transport {
            BrokerTransport::Wss => {
                options.set_transport(Transport::wss_with_default_config());
            }
            BrokerTransport::Ws => {
                options.set_transport(Transport::Ws);
            }
            BrokerTransport::Tcp => {}
        }
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if !self.login.is_empty() {
            options.set_credentials(self.login.clone(), self.pass.clone());
        }
        options
    }
}

struct BrokerLink {
    id: u64,
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// MQTT adapter handle
#[derive(Clone)]
pub struct MqttAdapter {
    link: Arc<Mutex<Option<BrokerLink>>>,
    connected: Arc<AtomicBool>,
    next_link: Arc<AtomicU64>,
    events: mpsc::Sender<TransportEvent>,
}

impl std::fmt::Debug for MqttAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttAdapter")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MqttAdapter {
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            link: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            next_link: Arc::new(AtomicU64::new(1)),
            events,
        }
    }

    /// Whether the current link has completed its handshake
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// (Re)start the broker link, replacing any existing one.
    ///
    /// Returns the id of the new link; its up/down events carry this id.
    pub async fn start(&self, options: &BrokerOptions) -> u64 {
        self.stop().await;

        let id = self.next_link.fetch_add(1, Ordering::SeqCst);
        let (client, eventloop) = AsyncClient::new(options.mqtt_options(), REQUEST_CAPACITY);

        info!(
            "MQTT: starting link {} to {}:{}",
            id, options.host, options.port
        );

        let task = tokio::spawn(run_event_loop(
            id,
            eventloop,
            client.clone(),
            options.prefix.clone(),
            options.hub_id.clone(),
            self.connected.clone(),
            self.events.clone(),
        ));

        *self.link.lock().await = Some(BrokerLink { id, client, task });
        id
    }

    /// Drop the broker link if there is one
    pub async fn stop(&self) {
        if let Some(link) = self.link.lock().await.take() {
            let _ = link.client.try_disconnect();
            link.task.abort();
            debug!("MQTT: link {} stopped", link.id);
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn publish(&self, topic: String, payload: impl Into<Vec<u8>>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::BrokerUnavailable);
        }
        let guard = self.link.lock().await;
        let link = guard.as_ref().ok_or(Error::BrokerUnavailable)?;
        trace!("MQTT: publish {}", topic);
        link.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.into())
            .map_err(|e| Error::transport(KIND, e.to_string()))
    }
}

impl TransportAdapter for MqttAdapter {
    fn kind(&self) -> ConnectionKind {
        KIND
    }

    async fn connect(&self, _target: &DeviceTarget) -> Result<()> {
        // Shared link, nothing per device
        Ok(())
    }

    async fn disconnect(&self, _target: &DeviceTarget) -> Result<()> {
        Ok(())
    }

    async fn send_focus(&self, target: &DeviceTarget) -> Result<()> {
        self.publish(target.command(DeviceCommand::Focus), Vec::new())
            .await
    }

    async fn send_unfocus(&self, target: &DeviceTarget) -> Result<()> {
        self.publish(target.command(DeviceCommand::Unfocus), Vec::new())
            .await
    }

    async fn discover(&self, request: &DiscoverRequest) -> Result<()> {
        // The broker has no notion of locality; both scopes are one broadcast
        self.publish(
            topics::discover_topic(&request.prefix),
            request.hub_id.clone(),
        )
        .await
    }

    async fn query_state(&self, target: &DeviceTarget, query: &Query) -> Result<()> {
        let (topic, value) = target.query(query);
        self.publish(topic, value.unwrap_or_default()).await
    }
}

async fn run_event_loop(
    link: u64,
    mut eventloop: EventLoop,
    client: AsyncClient,
    prefix: String,
    hub_id: String,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                if let Err(e) = client.try_subscribe(topics::hub_subscription(&prefix), QoS::AtMostOnce) {
                    warn!("MQTT: subscribe failed on link {}: {}", link, e);
                }
                info!("MQTT: link {} connected", link);
                let _ = events.send(TransportEvent::BrokerConnected { link }).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&prefix, &hub_id, &publish.topic, &publish.payload, &events).await;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                warn!("MQTT: link {} down: {}", link, e);
                let _ = events
                    .send(TransportEvent::BrokerDisconnected {
                        link,
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}

async fn handle_publish(
    prefix: &str,
    hub_id: &str,
    topic: &str,
    payload: &[u8],
    events: &mpsc::Sender<TransportEvent>,
) {
    match topics::parse_hub_topic(prefix, hub_id, topic) {
        Some(HubTopic::Reply { device_id }) => {
            let text = String::from_utf8_lossy(payload);
            match parse_inbound(&text, Some(device_id)) {
                Ok(message) => {
                    let _ = events
                        .send(TransportEvent::Received {
                            kind: KIND,
                            message,
                        })
                        .await;
                }
                Err(e) => debug!("MQTT: dropping reply from {}: {}", device_id, e),
            }
        }
        Some(HubTopic::Status { device_id }) => {
            trace!("MQTT: status from {}", device_id);
        }
        Some(HubTopic::Get { device_id, name }) => {
            trace!("MQTT: value {} from {}", name, device_id);
        }
        None => trace!("MQTT: ignoring topic {}", topic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubdeck_core::Inbound;

    fn options(transport: BrokerTransport) -> BrokerOptions {
        BrokerOptions {
            host: "test.mosquitto.org".into(),
            port: 8081,
            login: String::new(),
            pass: String::new(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
            transport,
            keep_alive: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_broker_addr_per_transport() {
        assert_eq!(
            options(BrokerTransport::Wss).broker_addr(),
            "wss://test.mosquitto.org:8081/mqtt"
        );
        assert_eq!(
            options(BrokerTransport::Ws).broker_addr(),
            "ws://test.mosquitto.org:8081/mqtt"
        );
        assert_eq!(options(BrokerTransport::Tcp).broker_addr(), "test.mosquitto.org");
    }

    #[test]
    fn test_broker_transport_serde_names() {
        let t: BrokerTransport = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(t, BrokerTransport::Tcp);
        assert_eq!(BrokerTransport::default(), BrokerTransport::Wss);
    }

    #[tokio::test]
    async fn test_publish_without_link_is_broker_unavailable() {
        let (tx, _rx) = mpsc::channel(8);
        let mqtt = MqttAdapter::new(tx);
        let target = DeviceTarget {
            id: "a1b2".into(),
            ip: String::new(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
        };
        assert!(!mqtt.is_connected());
        assert!(matches!(
            mqtt.send_focus(&target).await,
            Err(Error::BrokerUnavailable)
        ));
        // per-device connect is a no-op on the shared link
        tokio_test::assert_ok!(mqtt.connect(&target).await);
    }

    #[tokio::test]
    async fn test_reply_topic_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        handle_publish(
            "MyDevices",
            "3f9c",
            "MyDevices/hub/3f9c/a1b2",
            br#"{"type":"discover","id":"a1b2","name":"Lamp","ip":"","prefix":"MyDevices"}"#,
            &tx,
        )
        .await;

        match rx.recv().await {
            Some(TransportEvent::Received {
                kind,
                message: Inbound::Discover(reply),
            }) => {
                assert_eq!(kind, ConnectionKind::Mqtt);
                assert_eq!(reply.id, "a1b2");
                assert_eq!(reply.device.name, "Lamp");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_topic_is_not_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        handle_publish("MyDevices", "3f9c", "MyDevices/hub/a1b2/status", b"online", &tx).await;
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}

//! Local WebSocket transport
//!
//! One socket per focused device: opened on focus, closed on unfocus. Nothing
//! is held open while a device is not viewed. Discovery opens a short-lived
//! probe socket to each candidate host and waits for a `discover` reply.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, SplitSink};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use hubdeck_core::prelude::*;
use hubdeck_core::topics;
use hubdeck_core::{parse_inbound, ConnectionKind, DeviceId, Inbound};

use crate::adapter::{DeviceTarget, DiscoverRequest, DiscoverScope, Query, TransportAdapter};
use crate::events::TransportEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

const KIND: ConnectionKind = ConnectionKind::WebSocket;

/// Tuning for the WebSocket transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsOptions {
    /// Port hub firmware serves its socket on
    pub port: u16,
    /// How long one discovery probe waits for a reply
    pub probe_timeout: Duration,
    /// Upper bound on hosts swept in "discover all"
    pub max_sweep_hosts: usize,
    /// Probes in flight at once
    pub probe_concurrency: usize,
}

impl Default for WsOptions {
    fn default() -> Self {
        Self {
            port: 81,
            probe_timeout: Duration::from_millis(1500),
            max_sweep_hosts: 1024,
            probe_concurrency: 64,
        }
    }
}

/// An open per-device socket
struct WsLink {
    sink: WsSink,
    reader: JoinHandle<()>,
}

/// WebSocket adapter handle
#[derive(Clone)]
pub struct WebSocketAdapter {
    options: WsOptions,
    links: Arc<Mutex<HashMap<DeviceId, WsLink>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl std::fmt::Debug for WebSocketAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketAdapter")
            .field("options", &self.options)
            .finish()
    }
}

impl WebSocketAdapter {
    pub fn new(options: WsOptions, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            options,
            links: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn url(&self, ip: &str) -> String {
        format!("ws://{}:{}/", ip, self.options.port)
    }

    /// Hosts a discovery request should probe, deduplicated, known hosts first
    pub fn probe_hosts(&self, request: &DiscoverRequest) -> Vec<Ipv4Addr> {
        let mut seen = HashSet::new();
        let mut hosts: Vec<Ipv4Addr> = request
            .known_hosts
            .iter()
            .copied()
            .filter(|ip| seen.insert(*ip))
            .collect();

        if request.scope == DiscoverScope::All {
            if let Some(subnet) = request.subnet {
                hosts.extend(
                    subnet
                        .hosts(self.options.max_sweep_hosts)
                        .into_iter()
                        .filter(|ip| seen.insert(*ip)),
                );
            }
        }
        hosts
    }

    async fn send_text(&self, device_id: &str, text: String) -> Result<()> {
        let mut links = self.links.lock().await;
        let link = links
            .get_mut(device_id)
            .ok_or_else(|| Error::transport(KIND, format!("no socket open for {device_id}")))?;
        link.sink
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| Error::transport(KIND, e.to_string()))
    }
}

impl TransportAdapter for WebSocketAdapter {
    fn kind(&self) -> ConnectionKind {
        KIND
    }

    async fn connect(&self, target: &DeviceTarget) -> Result<()> {
        // Replace any stale socket for this device
        self.disconnect(target).await?;

        let url = self.url(&target.ip);
        let ws_stream = connect_ws(&url, self.options.probe_timeout).await?;
        let (sink, stream) = ws_stream.split();

        let reader = tokio::spawn(read_loop(
            target.id.clone(),
            stream,
            self.events.clone(),
        ));

        debug!("WS: socket open to {} ({})", target.id, url);
        self.links
            .lock()
            .await
            .insert(target.id.clone(), WsLink { sink, reader });
        Ok(())
    }

    async fn disconnect(&self, target: &DeviceTarget) -> Result<()> {
        let link = self.links.lock().await.remove(&target.id);
        if let Some(mut link) = link {
            link.reader.abort();
            let _ = link.sink.send(WsMessage::Close(None)).await;
            let _ = link.sink.close().await;
            debug!("WS: socket to {} closed", target.id);
        }
        Ok(())
    }

    async fn send_focus(&self, target: &DeviceTarget) -> Result<()> {
        self.send_text(&target.id, target.command(topics::DeviceCommand::Focus))
            .await
    }

    async fn send_unfocus(&self, target: &DeviceTarget) -> Result<()> {
        // Devices treat the socket close as unfocus
        trace!("WS: unfocus for {} is carried by the close", target.id);
        Ok(())
    }

    async fn discover(&self, request: &DiscoverRequest) -> Result<()> {
        let hosts = self.probe_hosts(request);
        debug!("WS: probing {} host(s) ({:?})", hosts.len(), request.scope);

        let frame = topics::discover_topic(&request.prefix);
        let options = self.options.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            stream::iter(hosts)
                .for_each_concurrent(options.probe_concurrency, |ip| {
                    let frame = frame.clone();
                    let events = events.clone();
                    let url = format!("ws://{}:{}/", ip, options.port);
                    let timeout = options.probe_timeout;
                    async move {
                        if let Some(message) = probe(&url, frame, timeout).await {
                            let _ = events
                                .send(TransportEvent::Received {
                                    kind: KIND,
                                    message,
                                })
                                .await;
                        }
                    }
                })
                .await;
        });
        Ok(())
    }

    async fn query_state(&self, target: &DeviceTarget, query: &Query) -> Result<()> {
        let frame = match target.query(query) {
            (command, Some(value)) => format!("{command}={value}"),
            (command, None) => command,
        };
        self.send_text(&target.id, frame).await
    }
}

async fn connect_ws(url: &str, timeout: Duration) -> Result<WsStream> {
    let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| Error::transport(KIND, format!("connect to {url} timed out")))?
        .map_err(|e| Error::transport(KIND, format!("connect to {url} failed: {e}")))?;
    Ok(ws_stream)
}

/// Forward frames from one device socket until it closes
async fn read_loop(
    device_id: DeviceId,
    mut stream: futures_util::stream::SplitStream<WsStream>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => match parse_inbound(text.as_str(), Some(&device_id)) {
                Ok(message) => {
                    if events
                        .send(TransportEvent::Received {
                            kind: KIND,
                            message,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => debug!("WS: dropping frame from {}: {}", device_id, e),
            },
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("WS: read error from {}: {}", device_id, e);
                break;
            }
        }
    }

    let _ = events
        .send(TransportEvent::SocketClosed {
            kind: KIND,
            device_id,
        })
        .await;
}

/// Open a throwaway socket, send the discovery frame, wait for a discover reply
async fn probe(url: &str, frame: String, timeout: Duration) -> Option<Inbound> {
    let attempt = async {
        let ws_stream = connect_ws(url, timeout).await.ok()?;
        let (mut sink, mut stream) = ws_stream.split();
        sink.send(WsMessage::Text(frame.into())).await.ok()?;

        let mut found = None;
        while let Some(Ok(frame)) = stream.next().await {
            if let WsMessage::Text(text) = frame {
                if let Ok(message @ Inbound::Discover(_)) = parse_inbound(text.as_str(), None) {
                    found = Some(message);
                    break;
                }
            }
        }
        let _ = sink.close().await;
        found
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(found) => found,
        Err(_) => {
            trace!("WS: probe {} timed out", url);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subnet::Subnet;

    fn adapter(max_sweep_hosts: usize) -> WebSocketAdapter {
        let (tx, _rx) = mpsc::channel(8);
        WebSocketAdapter::new(
            WsOptions {
                max_sweep_hosts,
                ..Default::default()
            },
            tx,
        )
    }

    fn request(scope: DiscoverScope) -> DiscoverRequest {
        DiscoverRequest {
            scope,
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
            known_hosts: vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 2)],
            subnet: Subnet::from_client("10.0.0.1", 29),
        }
    }

    #[test]
    fn test_nearby_probes_only_known_hosts() {
        let hosts = adapter(1024).probe_hosts(&request(DiscoverScope::Nearby));
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn test_all_sweeps_subnet_without_duplicates() {
        let hosts = adapter(1024).probe_hosts(&request(DiscoverScope::All));
        // /29 has 6 usable hosts; 10.0.0.2 is known and not repeated
        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_sweep_is_capped() {
        let hosts = adapter(3).probe_hosts(&request(DiscoverScope::All));
        // known host plus three swept, one of which is the known host
        assert_eq!(hosts.len(), 3);
    }

    #[tokio::test]
    async fn test_focus_without_socket_is_transport_error() {
        let ws = adapter(16);
        let target = DeviceTarget {
            id: "a1b2".into(),
            ip: "127.0.0.1".into(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
        };
        let err = ws.send_focus(&target).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        // disconnect of a device with no socket is a no-op
        tokio_test::assert_ok!(ws.disconnect(&target).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_no_reply() {
        let found = probe(
            "ws://127.0.0.1:1/",
            "MyDevices".to_string(),
            Duration::from_millis(200),
        )
        .await;
        assert!(found.is_none());
    }
}

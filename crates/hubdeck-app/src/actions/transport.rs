//! Transport worker: the only task that drives adapters
//!
//! Commands are executed one at a time in submission order, so the teardown
//! of a session always finishes before the next session's connect starts.
//! Discovery is the exception: each adapter's broadcast runs on its own task
//! because a subnet sweep can outlive the discovery window.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use hubdeck_core::prelude::*;
use hubdeck_core::ConnectionKind;
use hubdeck_transport::{
    AdapterSet, BrokerOptions, DeviceTarget, DiscoverRequest, Query, TransportAdapter,
};

use crate::message::Message;

/// Work queued for the transport worker
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Discover {
        request: DiscoverRequest,
        kinds: Vec<ConnectionKind>,
    },
    /// connect + send_focus, answered with `SessionLinkResult`
    Open {
        target: DeviceTarget,
        kind: ConnectionKind,
        generation: u64,
    },
    /// send_unfocus + disconnect
    Close {
        target: DeviceTarget,
        kind: ConnectionKind,
    },
    Query {
        target: DeviceTarget,
        kind: ConnectionKind,
        query: Query,
    },
    StartBroker {
        options: BrokerOptions,
    },
    StopBroker,
}

/// Spawn the worker; it exits when the queue closes or shutdown is signalled
/// and the queue is empty.
pub fn spawn_transport_worker(
    adapters: AdapterSet,
    mut rx: mpsc::UnboundedReceiver<TransportCommand>,
    msg_tx: mpsc::Sender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                cmd = rx.recv() => match cmd {
                    Some(cmd) => run_command(&adapters, cmd, &msg_tx).await,
                    None => break,
                },

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        adapters.stop_broker().await;
        debug!("Transport worker stopped");
    })
}

async fn run_command(adapters: &AdapterSet, cmd: TransportCommand, msg_tx: &mpsc::Sender<Message>) {
    match cmd {
        TransportCommand::Discover { request, kinds } => {
            for kind in kinds {
                let Some(adapter) = adapters.get(kind).cloned() else {
                    continue;
                };
                let request = request.clone();
                let msg_tx = msg_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = adapter.discover(&request).await {
                        report_failure(&msg_tx, kind, "discover", e).await;
                    }
                });
            }
        }

        TransportCommand::Open {
            target,
            kind,
            generation,
        } => {
            let result = match adapters.get(kind) {
                Some(adapter) => open_link(adapter, &target).await,
                None => Err(Error::transport(kind, "device is offline")),
            };
            if let Err(e) = &result {
                log_failure(kind, "connect", e);
            }
            let _ = msg_tx
                .send(Message::SessionLinkResult {
                    generation,
                    result: result.map_err(|e| e.to_string()),
                })
                .await;
        }

        TransportCommand::Close { target, kind } => {
            let Some(adapter) = adapters.get(kind) else {
                return;
            };
            // Teardown errors never block the next open
            if let Err(e) = adapter.send_unfocus(&target).await {
                log_failure(kind, "unfocus", &e);
            }
            if let Err(e) = adapter.disconnect(&target).await {
                log_failure(kind, "disconnect", &e);
            }
        }

        TransportCommand::Query {
            target,
            kind,
            query,
        } => {
            let Some(adapter) = adapters.get(kind) else {
                return;
            };
            if let Err(e) = adapter.query_state(&target, &query).await {
                report_failure(msg_tx, kind, "query", e).await;
            }
        }

        TransportCommand::StartBroker { options } => {
            match adapters.start_broker(&options).await {
                Some(link) => info!("MQTT link {} starting ({})", link, options.broker_addr()),
                None => warn!("No broker-capable adapter configured"),
            }
        }

        TransportCommand::StopBroker => adapters.stop_broker().await,
    }
}

async fn open_link(adapter: &impl TransportAdapter, target: &DeviceTarget) -> Result<()> {
    adapter.connect(target).await?;
    adapter.send_focus(target).await
}

fn log_failure(kind: ConnectionKind, operation: &str, error: &Error) {
    if matches!(error, Error::Unsupported { .. }) {
        warn!("{}", error);
    } else {
        debug!("{} {} failed: {}", kind, operation, error);
    }
}

async fn report_failure(
    msg_tx: &mpsc::Sender<Message>,
    kind: ConnectionKind,
    operation: &'static str,
    error: Error,
) {
    log_failure(kind, operation, &error);
    let _ = msg_tx
        .send(Message::TransportFailed {
            kind,
            operation,
            error: error.to_string(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubdeck_transport::test_utils::CallLog;
    use hubdeck_transport::{DiscoverScope, TransportEvent};
    use std::time::Duration;

    fn target(id: &str) -> DeviceTarget {
        DeviceTarget {
            id: id.into(),
            ip: "192.168.1.20".into(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
        }
    }

    struct Harness {
        log: CallLog,
        cmd_tx: mpsc::UnboundedSender<TransportCommand>,
        msg_rx: mpsc::Receiver<Message>,
        _events_rx: mpsc::Receiver<TransportEvent>,
        shutdown_tx: watch::Sender<bool>,
        worker: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let log = CallLog::default();
        let (events_tx, events_rx) = mpsc::channel(32);
        let adapters = AdapterSet::recording(log.clone(), events_tx);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = spawn_transport_worker(adapters, cmd_rx, msg_tx, shutdown_rx);
        Harness {
            log,
            cmd_tx,
            msg_rx,
            _events_rx: events_rx,
            shutdown_tx,
            worker,
        }
    }

    #[tokio::test]
    async fn test_close_completes_before_next_open() {
        let mut h = harness();
        h.cmd_tx
            .send(TransportCommand::Close {
                target: target("a1"),
                kind: ConnectionKind::WebSocket,
            })
            .unwrap();
        h.cmd_tx
            .send(TransportCommand::Open {
                target: target("b2"),
                kind: ConnectionKind::Mqtt,
                generation: 7,
            })
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), h.msg_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(Message::SessionLinkResult {
                generation: 7,
                result: Ok(()),
            })
        );
        assert_eq!(
            h.log.ops(),
            vec!["WS:send_unfocus", "WS:disconnect", "MQTT:connect", "MQTT:send_focus"]
        );
    }

    #[tokio::test]
    async fn test_open_with_no_transport_reports_error() {
        let mut h = harness();
        h.cmd_tx
            .send(TransportCommand::Open {
                target: target("a1"),
                kind: ConnectionKind::None,
                generation: 1,
            })
            .unwrap();

        match h.msg_rx.recv().await {
            Some(Message::SessionLinkResult { generation: 1, result: Err(_) }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_then_stops_broker() {
        let h = harness();
        h.cmd_tx
            .send(TransportCommand::Query {
                target: target("a1"),
                kind: ConnectionKind::WebSocket,
                query: Query::Ping,
            })
            .unwrap();
        h.shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), h.worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.log.ops(), vec!["WS:query_ping", "MQTT:stop_broker"]);
    }

    #[tokio::test]
    async fn test_discover_fans_out_to_kinds() {
        let h = harness();
        h.cmd_tx
            .send(TransportCommand::Discover {
                request: DiscoverRequest {
                    scope: DiscoverScope::Nearby,
                    prefix: "MyDevices".into(),
                    hub_id: "3f9c".into(),
                    known_hosts: vec![],
                    subnet: None,
                },
                kinds: vec![ConnectionKind::WebSocket, ConnectionKind::Mqtt],
            })
            .unwrap();

        for _ in 0..50 {
            if h.log.count("discover") == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut ops = h.log.ops();
        ops.sort();
        assert_eq!(ops, vec!["MQTT:discover", "WS:discover"]);
    }
}

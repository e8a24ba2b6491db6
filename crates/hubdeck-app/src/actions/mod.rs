//! Action handlers: UpdateAction dispatch to the transport worker, timers
//! and the config store

use std::sync::Arc;

use tokio::sync::mpsc;

use hubdeck_core::prelude::*;

use crate::config::ConfigStore;
use crate::handler::UpdateAction;
use crate::message::Message;

pub mod timers;
pub mod transport;

pub use timers::{spawn_discovery_window, spawn_reconnect_ticker, LivenessSlot, RECONNECT_PERIOD};
pub use transport::{spawn_transport_worker, TransportCommand};

/// Everything an action needs to reach outside the state
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub msg_tx: mpsc::Sender<Message>,
    pub transport_tx: mpsc::UnboundedSender<TransportCommand>,
    pub store: Arc<ConfigStore>,
    pub liveness: LivenessSlot,
}

impl ActionContext {
    fn submit(&self, cmd: TransportCommand) {
        if self.transport_tx.send(cmd).is_err() {
            warn!("Transport worker is gone, command dropped");
        }
    }
}

/// Execute an action
///
/// Transport work is queued for the worker and never awaited here. Persist
/// runs inline: storage writes are small and must land before the next
/// message is processed.
pub fn handle_action(action: UpdateAction, ctx: &ActionContext) {
    match action {
        UpdateAction::Discover {
            request,
            kinds,
            pass,
            window,
        } => {
            ctx.submit(TransportCommand::Discover { request, kinds });
            spawn_discovery_window(ctx.msg_tx.clone(), pass, window);
        }

        UpdateAction::OpenSession {
            target,
            kind,
            generation,
            liveness,
        } => {
            ctx.liveness.arm(ctx.msg_tx.clone(), generation, liveness);
            ctx.submit(TransportCommand::Open {
                target,
                kind,
                generation,
            });
        }

        UpdateAction::CloseSession { target, kind } => {
            ctx.liveness.disarm();
            ctx.submit(TransportCommand::Close { target, kind });
        }

        UpdateAction::QueryDevice {
            target,
            kind,
            query,
        } => ctx.submit(TransportCommand::Query {
            target,
            kind,
            query,
        }),

        UpdateAction::StartBroker { options } => {
            ctx.submit(TransportCommand::StartBroker { options })
        }

        UpdateAction::StopBroker => ctx.submit(TransportCommand::StopBroker),

        UpdateAction::Persist { config, devices } => {
            if let Some(config) = config {
                match ctx.store.save(&config) {
                    Ok(()) => debug!("Config saved"),
                    Err(e) => warn!("Failed to save config: {}", e),
                }
            }
            if let Some(devices) = devices {
                match ctx.store.save_devices(&devices) {
                    Ok(()) => debug!("Device registry saved ({} entries)", devices.len()),
                    Err(e) => warn!("Failed to save devices: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MemoryStorage};
    use crate::config::store::{CONFIG_KEY, DEVICES_KEY};
    use hubdeck_core::{ConnectionKind, DeviceRegistry};
    use hubdeck_transport::DeviceTarget;
    use std::time::Duration;

    fn context() -> (
        ActionContext,
        MemoryStorage,
        mpsc::UnboundedReceiver<TransportCommand>,
        mpsc::Receiver<Message>,
    ) {
        let storage = MemoryStorage::new();
        let (msg_tx, msg_rx) = mpsc::channel(16);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let ctx = ActionContext {
            msg_tx,
            transport_tx,
            store: Arc::new(ConfigStore::new(storage.clone())),
            liveness: LivenessSlot::new(),
        };
        (ctx, storage, transport_rx, msg_rx)
    }

    fn target() -> DeviceTarget {
        DeviceTarget {
            id: "a1".into(),
            ip: "192.168.1.20".into(),
            prefix: "MyDevices".into(),
            hub_id: "3f9c".into(),
        }
    }

    #[tokio::test]
    async fn test_persist_writes_only_given_halves() {
        let (ctx, storage, _transport_rx, _msg_rx) = context();

        handle_action(
            UpdateAction::Persist {
                config: Some(Config::defaults("3f9c")),
                devices: None,
            },
            &ctx,
        );
        assert_eq!(storage.write_count(CONFIG_KEY), 1);
        assert_eq!(storage.write_count(DEVICES_KEY), 0);

        handle_action(
            UpdateAction::Persist {
                config: None,
                devices: Some(DeviceRegistry::new()),
            },
            &ctx,
        );
        assert_eq!(storage.write_count(CONFIG_KEY), 1);
        assert_eq!(storage.value(DEVICES_KEY).as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_open_arms_liveness_and_close_disarms() {
        let (ctx, _storage, mut transport_rx, _msg_rx) = context();

        handle_action(
            UpdateAction::OpenSession {
                target: target(),
                kind: ConnectionKind::WebSocket,
                generation: 4,
                liveness: Duration::from_secs(3),
            },
            &ctx,
        );
        assert!(ctx.liveness.is_armed());
        assert!(matches!(
            transport_rx.try_recv(),
            Ok(TransportCommand::Open { generation: 4, .. })
        ));

        handle_action(
            UpdateAction::CloseSession {
                target: target(),
                kind: ConnectionKind::WebSocket,
            },
            &ctx,
        );
        assert!(!ctx.liveness.is_armed());
        assert!(matches!(
            transport_rx.try_recv(),
            Ok(TransportCommand::Close { .. })
        ));
    }

    #[tokio::test]
    async fn test_discover_schedules_window() {
        let (ctx, _storage, mut transport_rx, mut msg_rx) = context();

        handle_action(
            UpdateAction::Discover {
                request: hubdeck_transport::DiscoverRequest {
                    scope: hubdeck_transport::DiscoverScope::Nearby,
                    prefix: "MyDevices".into(),
                    hub_id: "3f9c".into(),
                    known_hosts: vec![],
                    subnet: None,
                },
                kinds: vec![ConnectionKind::Mqtt],
                pass: 2,
                window: Duration::from_millis(10),
            },
            &ctx,
        );

        assert!(matches!(
            transport_rx.try_recv(),
            Ok(TransportCommand::Discover { .. })
        ));
        let msg = tokio::time::timeout(Duration::from_secs(1), msg_rx.recv())
            .await
            .unwrap();
        assert_eq!(msg, Some(Message::DiscoveryWindowElapsed { pass: 2 }));
    }
}

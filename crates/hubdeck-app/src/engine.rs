//! Engine - owns the state, the channels and the background tasks
//!
//! The headless runner (and any other front end) drives the engine by
//! feeding it messages and subscribing to its [`EngineEvent`]s.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use hubdeck_core::prelude::*;
use hubdeck_core::{hub_id_from_millis, ConnectionKind, DeviceId, InfoTopics};
use hubdeck_transport::{AdapterSet, TransportEvent};

use crate::actions::{
    spawn_reconnect_ticker, spawn_transport_worker, ActionContext, LivenessSlot, RECONNECT_PERIOD,
};
use crate::config::{self, Config, ConfigStore, FileStorage, Settings, Storage};
use crate::engine_event::EngineEvent;
use crate::message::Message;
use crate::process;
use crate::session::SessionPhase;
use crate::signals;
use crate::state::{AppState, HostContext, Notice, Screen};

/// Lightweight snapshot of state for change detection.
///
/// Captured before message processing, compared after to detect
/// what changed and emit appropriate EngineEvents.
#[derive(Debug, Clone, PartialEq)]
struct StateSnapshot {
    screen: Screen,
    session: Option<SessionSnapshot>,
    banner: Option<String>,
    config_revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct SessionSnapshot {
    device_id: DeviceId,
    generation: u64,
    phase: SessionPhase,
    kind: ConnectionKind,
}

impl StateSnapshot {
    fn capture(state: &AppState) -> Self {
        Self {
            screen: state.screen,
            session: state.session.current().map(|s| SessionSnapshot {
                device_id: s.device_id().to_string(),
                generation: s.generation,
                phase: s.phase,
                kind: s.kind,
            }),
            banner: state.banner.clone(),
            config_revision: state.config_revision,
        }
    }

    fn focused(&self) -> Option<&DeviceId> {
        self.session.as_ref().map(|s| &s.device_id)
    }

    fn generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }
}

/// Where the engine keeps its files and what page it pretends to be served from
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Data directory; `None` uses `<data_local_dir>/hubdeck`
    pub data_dir: Option<PathBuf>,
    pub host: HostContext,
}

impl EngineOptions {
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hubdeck")
        })
    }
}

/// Orchestration engine for hubdeck.
pub struct Engine {
    /// TEA application state (the Model)
    pub state: AppState,

    /// Sender half of the unified message channel.
    pub msg_tx: mpsc::Sender<Message>,

    /// Receiver half of the unified message channel.
    /// The front-end event loop drains messages from here.
    pub msg_rx: mpsc::Receiver<Message>,

    /// Send `true` to initiate shutdown.
    pub shutdown_tx: watch::Sender<bool>,

    pub shutdown_rx: watch::Receiver<bool>,

    pub settings: Settings,

    ctx: ActionContext,

    transport_worker: Option<JoinHandle<()>>,

    reconnect_ticker: Option<JoinHandle<()>>,

    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Create an engine on the real file storage and transports.
    ///
    /// Must be called inside a tokio runtime. Also spawns the OS signal
    /// handler.
    pub fn new(options: EngineOptions) -> Self {
        let data_dir = options.resolve_data_dir();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            warn!("Failed to create data directory {}: {}", data_dir.display(), e);
        }

        let settings = config::load_settings(&data_dir);
        let ws_options = settings.ws_options();
        let engine = Self::with_adapters(
            options.host,
            settings,
            FileStorage::new(&data_dir),
            move |events| AdapterSet::new(ws_options, events),
        );

        signals::spawn_signal_handler(engine.msg_tx.clone());
        engine
    }

    /// Create an engine on any storage and adapter set.
    ///
    /// `make_adapters` receives the sender the adapters report
    /// [`TransportEvent`]s on.
    pub fn with_adapters(
        host: HostContext,
        settings: Settings,
        storage: impl Storage + 'static,
        make_adapters: impl FnOnce(mpsc::Sender<TransportEvent>) -> AdapterSet,
    ) -> Self {
        // 1. Load config and registry
        let hub_id = hub_id_from_millis(chrono::Utc::now().timestamp_millis());
        let store = Arc::new(ConfigStore::new(storage));
        let loaded = store.load(Config::defaults(&hub_id));
        let devices = store.load_devices();
        info!(
            "Loaded config (hub {}) and {} device(s)",
            loaded.config.hub_id(),
            devices.len()
        );

        // 2. Create state
        let mut state = AppState::new(loaded.config, devices, settings.clone(), host);
        state.show_changelog = loaded.show_changelog;

        // 3. Channels
        let (msg_tx, msg_rx) = mpsc::channel::<Message>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(256);

        // 4. Bridge transport events to app messages
        let (transport_events_tx, mut transport_events_rx) = mpsc::channel::<TransportEvent>(256);
        let bridge_tx = msg_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = transport_events_rx.recv().await {
                if bridge_tx.send(Message::Transport(event)).await.is_err() {
                    break;
                }
            }
        });

        // 5. Transport worker and broker supervisor
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let transport_worker = spawn_transport_worker(
            make_adapters(transport_events_tx),
            transport_rx,
            msg_tx.clone(),
            shutdown_rx.clone(),
        );
        let reconnect_ticker =
            spawn_reconnect_ticker(msg_tx.clone(), RECONNECT_PERIOD, shutdown_rx.clone());

        let ctx = ActionContext {
            msg_tx: msg_tx.clone(),
            transport_tx,
            store,
            liveness: LivenessSlot::new(),
        };

        Self {
            state,
            msg_tx,
            msg_rx,
            shutdown_tx,
            shutdown_rx,
            settings,
            ctx,
            transport_worker: Some(transport_worker),
            reconnect_ticker: Some(reconnect_ticker),
            event_tx,
        }
    }

    /// Subscribe to engine events.
    ///
    /// If the subscriber falls behind (buffer full), older events are
    /// dropped and the receiver reports `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Process a single message through the TEA update cycle and emit the
    /// resulting EngineEvents.
    pub fn process_message(&mut self, msg: Message) {
        let pre = StateSnapshot::capture(&self.state);

        process::process_message(&mut self.state, msg, &self.ctx);

        let post = StateSnapshot::capture(&self.state);
        self.emit_events(&pre, &post);
        self.emit_notices();
    }

    /// Drain and process all pending messages from the channel.
    ///
    /// Returns the number of messages processed.
    pub fn drain_pending_messages(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.process_message(msg);
            count += 1;
        }
        count
    }

    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn should_quit(&self) -> bool {
        self.state.should_quit()
    }

    /// Signal background tasks to stop and wait for the transport worker to
    /// finish its queue.
    pub async fn shutdown(&mut self) {
        self.emit(EngineEvent::Shutdown);

        self.ctx.liveness.disarm();
        let _ = self.shutdown_tx.send(true);

        let tasks = [
            ("transport worker", self.transport_worker.take()),
            ("reconnect ticker", self.reconnect_ticker.take()),
        ];
        for (name, handle) in tasks {
            let Some(handle) = handle else {
                continue;
            };
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("{} stopped", name),
                Ok(Err(e)) => warn!("{} panicked: {}", name, e),
                Err(_) => warn!("{} shutdown timed out", name),
            }
        }
    }

    /// Emit EngineEvents based on state changes after processing.
    fn emit_events(&self, pre: &StateSnapshot, post: &StateSnapshot) {
        // A different (or no) generation means the old session is gone
        if let Some(old) = &pre.session {
            if post.generation() != Some(old.generation) {
                self.emit(EngineEvent::SessionClosed {
                    device_id: old.device_id.clone(),
                });
            }
        }

        if let Some(new) = &post.session {
            let was_open = pre.generation() == Some(new.generation)
                && pre.session.as_ref().is_some_and(|s| s.phase == SessionPhase::Open);
            if new.phase == SessionPhase::Open && !was_open {
                self.emit(EngineEvent::SessionOpened {
                    device_id: new.device_id.clone(),
                    kind: new.kind,
                });
            }
        }

        if pre.screen != post.screen || pre.focused() != post.focused() {
            let info_topics = match (post.screen, post.focused()) {
                (Screen::Info, Some(id)) => {
                    let prefix = self
                        .state
                        .devices
                        .get(id)
                        .map(|d| d.prefix.clone())
                        .filter(|p| !p.is_empty())
                        .unwrap_or_else(|| self.state.config.prefix());
                    Some(InfoTopics::for_device(&prefix, id))
                }
                _ => None,
            };
            self.emit(EngineEvent::ScreenChanged {
                screen: post.screen,
                focused: post.focused().cloned(),
                info_topics,
            });
        }

        if pre.banner != post.banner {
            self.emit(EngineEvent::Banner {
                text: post.banner.clone(),
            });
        }

        if pre.config_revision != post.config_revision {
            self.emit(EngineEvent::ConfigApplied {
                entries: self.state.config.presentation(),
            });
        }
    }

    /// Turn queued notices into events; repeated device updates collapse
    fn emit_notices(&mut self) {
        let mut updated = HashSet::new();
        for notice in self.state.take_notices() {
            match notice {
                Notice::DeviceUpdated(id) => {
                    if !updated.insert(id.clone()) {
                        continue;
                    }
                    if let Some(device) = self.state.devices.get(&id) {
                        self.emit(EngineEvent::DeviceUpdated {
                            device: device.clone(),
                            conn: self.state.conn(&id),
                            id,
                        });
                    }
                }
                Notice::DeviceRemoved(id) => self.emit(EngineEvent::DeviceRemoved { id }),
                Notice::PromptDelete(id) => self.emit(EngineEvent::PromptDelete { id }),
                Notice::ExportReady(blob) => self.emit(EngineEvent::ExportReady { blob }),
                Notice::Changelog => self.emit(EngineEvent::Changelog {
                    version: self
                        .state
                        .config
                        .version()
                        .unwrap_or(config::APP_VERSION)
                        .to_string(),
                }),
                Notice::Payload(payload) => self.emit(EngineEvent::Payload(payload)),
            }
        }
    }

    /// Emit a single EngineEvent to all subscribers.
    ///
    /// send() fails only when nobody is subscribed, which is fine.
    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::{CONFIG_KEY, DEVICES_KEY};
    use crate::config::MemoryStorage;
    use hubdeck_transport::test_utils::CallLog;

    fn engine_with(storage: MemoryStorage) -> (Engine, CallLog) {
        let log = CallLog::default();
        let adapters_log = log.clone();
        let engine = Engine::with_adapters(
            HostContext::default(),
            Settings::default(),
            storage,
            move |events| AdapterSet::recording(adapters_log, events),
        );
        (engine, log)
    }

    fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_engine_loads_registry() {
        let storage = MemoryStorage::new().with_value(
            DEVICES_KEY,
            r#"{"a1":{"name":"Lamp","ip":"192.168.1.20","prefix":"MyDevices","PIN":0}}"#,
        );
        let (engine, _log) = engine_with(storage.clone());

        assert!(engine.state.devices.contains("a1"));
        assert!(!engine.should_quit());
        // Fresh install: nothing persisted, nothing saved
        assert_eq!(storage.write_count(CONFIG_KEY), 0);
    }

    #[tokio::test]
    async fn test_engine_process_quit_message() {
        let (mut engine, _log) = engine_with(MemoryStorage::new());
        engine.process_message(Message::Quit);
        assert!(engine.should_quit());
    }

    #[tokio::test]
    async fn test_subscribe_receives_shutdown_event() {
        let (mut engine, _log) = engine_with(MemoryStorage::new());
        let mut rx = engine.subscribe();

        engine.shutdown().await;

        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(event)) => assert_eq!(event, EngineEvent::Shutdown),
            _ => panic!("Should have received shutdown event"),
        }
    }

    #[tokio::test]
    async fn test_startup_applies_config_and_discovers() {
        let storage = MemoryStorage::new().with_value(CONFIG_KEY, r#"{"use_ws": true}"#);
        let (mut engine, log) = engine_with(storage);
        let mut rx = engine.subscribe();

        engine.process_message(Message::Startup);

        let events = drain_events(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::ConfigApplied { entries } if !entries.contains_key("version")
        )));
        assert!(engine.state.discovery.in_flight);

        for _ in 0..50 {
            if log.count("discover") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(log.ops(), vec!["WS:discover"]);
    }

    #[tokio::test]
    async fn test_version_change_raises_changelog() {
        let storage = MemoryStorage::new().with_value(CONFIG_KEY, r#"{"version": "0.0.1"}"#);
        let (mut engine, _log) = engine_with(storage.clone());
        assert_eq!(storage.write_count(CONFIG_KEY), 1);

        let mut rx = engine.subscribe();
        engine.process_message(Message::Startup);

        let events = drain_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Changelog { version } if version == config::APP_VERSION)));
    }

    #[tokio::test]
    async fn test_session_events_follow_link_result() {
        let storage = MemoryStorage::new().with_value(
            DEVICES_KEY,
            r#"{"a1":{"name":"Lamp","ip":"192.168.1.20","prefix":"MyDevices","PIN":0}}"#,
        );
        let (mut engine, _log) = engine_with(storage);
        engine.state.started = true;
        engine.state.runtime_mut("a1").conn = ConnectionKind::WebSocket;
        let mut rx = engine.subscribe();

        engine.process_message(Message::OpenDevice { id: "a1".into() });
        let generation = engine.state.session.current().unwrap().generation;
        engine.process_message(Message::SessionLinkResult {
            generation,
            result: Ok(()),
        });
        engine.process_message(Message::OpenInfo);
        engine.process_message(Message::Back);
        engine.process_message(Message::Back);

        let events = drain_events(&mut rx);
        let screens: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ScreenChanged { screen, .. } => Some(*screen),
                _ => None,
            })
            .collect();
        assert_eq!(
            screens,
            vec![Screen::Device, Screen::Info, Screen::Device, Screen::Main]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::ScreenChanged {
                screen: Screen::Info,
                info_topics: Some(topics),
                ..
            } if topics.status == "MyDevices/hub/a1/status"
        )));
        assert!(events.contains(&EngineEvent::SessionOpened {
            device_id: "a1".into(),
            kind: ConnectionKind::WebSocket,
        }));
        assert!(events.contains(&EngineEvent::SessionClosed {
            device_id: "a1".into(),
        }));
    }

    #[test]
    fn test_data_dir_override() {
        let options = EngineOptions {
            data_dir: Some(PathBuf::from("/tmp/hubdeck-test")),
            host: HostContext::default(),
        };
        assert_eq!(options.resolve_data_dir(), PathBuf::from("/tmp/hubdeck-test"));
    }
}

//! End-to-end engine flows over recording adapters
//!
//! Drives a real [`Engine`] (worker, timers, bridge task) the way the headless
//! runner does, with in-memory storage instead of files.

use std::time::Duration;

use tokio::sync::broadcast;

use hubdeck_app::config::store::{CONFIG_KEY, DEVICES_KEY};
use hubdeck_app::config::{MemoryStorage, Settings};
use hubdeck_app::{Engine, EngineEvent, HostContext, Message, Screen};
use hubdeck_core::{ConnectionKind, Device, DiscoverReply};
use hubdeck_transport::test_utils::{CallLog, RecordingAdapter};
use hubdeck_transport::{Adapter, AdapterSet};

fn lamp_reply() -> DiscoverReply {
    DiscoverReply {
        id: "a1b2".into(),
        device: Device {
            name: "Lamp".into(),
            ip: "192.168.1.20".into(),
            prefix: "MyDevices".into(),
            ..Default::default()
        },
    }
}

fn engine_with(storage: MemoryStorage) -> (Engine, CallLog) {
    let mut settings = Settings::default();
    settings.discovery.window_ms = 50;

    let log = CallLog::default();
    let adapters_log = log.clone();
    let engine = Engine::with_adapters(HostContext::default(), settings, storage, move |events| {
        let make = |kind| Adapter::Recording(RecordingAdapter::new(kind, adapters_log.clone(), events.clone()));
        let websocket = RecordingAdapter::new(ConnectionKind::WebSocket, adapters_log.clone(), events.clone())
            .with_reply(lamp_reply());
        AdapterSet::from_adapters(
            Adapter::Recording(websocket),
            make(ConnectionKind::Mqtt),
            make(ConnectionKind::Bluetooth),
            make(ConnectionKind::Serial),
        )
    });
    (engine, log)
}

/// Process queued messages until `done` matches an emitted event
async fn pump_until(
    engine: &mut Engine,
    events: &mut broadcast::Receiver<EngineEvent>,
    seen: &mut Vec<EngineEvent>,
    done: impl Fn(&EngineEvent) -> bool,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        while let Ok(event) = events.try_recv() {
            let hit = done(&event);
            seen.push(event);
            if hit {
                return;
            }
        }
        let msg = tokio::time::timeout_at(deadline, engine.msg_rx.recv())
            .await
            .expect("timed out waiting for engine event")
            .expect("message channel closed");
        engine.process_message(msg);
    }
}

#[tokio::test]
async fn test_discover_open_and_close_device() {
    let storage = MemoryStorage::new().with_value(CONFIG_KEY, r#"{"use_ws": true}"#);
    let (mut engine, log) = engine_with(storage.clone());
    let mut events = engine.subscribe();
    let mut seen = Vec::new();

    engine.process_message(Message::Startup);
    pump_until(&mut engine, &mut events, &mut seen, |e| {
        matches!(e, EngineEvent::DeviceUpdated { id, conn: ConnectionKind::WebSocket, .. } if id == "a1b2")
    })
    .await;

    assert!(engine.state.devices.contains("a1b2"));
    let persisted = storage.value(DEVICES_KEY).unwrap_or_default();
    assert!(persisted.contains("a1b2"));

    engine.process_message(Message::OpenDevice { id: "a1b2".into() });
    pump_until(&mut engine, &mut events, &mut seen, |e| {
        matches!(e, EngineEvent::SessionOpened { .. })
    })
    .await;

    assert_eq!(engine.state.screen, Screen::Device);
    let ops = log.ops();
    let connect = ops.iter().position(|op| op == "WS:connect").unwrap();
    let focus = ops.iter().position(|op| op == "WS:send_focus").unwrap();
    assert!(connect < focus);

    engine.process_message(Message::Back);
    pump_until(&mut engine, &mut events, &mut seen, |e| {
        matches!(e, EngineEvent::SessionClosed { device_id } if device_id == "a1b2")
    })
    .await;
    assert_eq!(engine.state.screen, Screen::Main);

    engine.shutdown().await;
    assert!(log.ops().contains(&"WS:disconnect".to_string()));
}

#[tokio::test]
async fn test_discovery_window_closes_pass() {
    let storage = MemoryStorage::new().with_value(CONFIG_KEY, r#"{"use_ws": true}"#);
    let (mut engine, _log) = engine_with(storage);

    engine.process_message(Message::Startup);
    assert!(engine.state.discovery.in_flight);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while engine.state.discovery.in_flight {
        let msg = tokio::time::timeout_at(deadline, engine.msg_rx.recv())
            .await
            .expect("discovery window never elapsed")
            .expect("message channel closed");
        engine.process_message(msg);
    }

    engine.process_message(Message::Quit);
    assert!(engine.should_quit());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_export_then_import_restores_registry() {
    let storage = MemoryStorage::new().with_value(
        DEVICES_KEY,
        r#"{"a1":{"name":"Lamp","ip":"192.168.1.20","prefix":"MyDevices","PIN":0}}"#,
    );
    let (mut engine, _log) = engine_with(storage.clone());
    let mut events = engine.subscribe();

    engine.process_message(Message::Export);
    let blob = std::iter::from_fn(|| events.try_recv().ok())
        .find_map(|e| match e {
            EngineEvent::ExportReady { blob } => Some(blob),
            _ => None,
        })
        .expect("export blob");

    engine.process_message(Message::ClearDevices);
    assert!(!engine.state.devices.contains("a1"));

    engine.process_message(Message::Import { blob });
    assert!(engine.state.devices.contains("a1"));
    assert!(storage.value(DEVICES_KEY).unwrap_or_default().contains("a1"));

    engine.shutdown().await;
}

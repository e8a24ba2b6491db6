//! Transport event handlers
//!
//! Everything here resumes work started on an earlier turn, so each handler
//! first checks the event still concerns the current session, pass or link.

use serde_json::Value;

use hubdeck_core::prelude::*;
use hubdeck_core::{ConnectionKind, DiscoverReply, Inbound};
use hubdeck_transport::TransportEvent;

use crate::session::SessionPhase;
use crate::state::{AppState, Notice, Payload, PayloadKind, Screen};

use super::session::{mark_alive, CONNECTION_LOST_BANNER};
use super::{UpdateAction, UpdateResult};

pub(crate) fn handle_transport_event(state: &mut AppState, event: TransportEvent) -> UpdateResult {
    match event {
        TransportEvent::Received { kind, message } => handle_inbound(state, kind, message),
        TransportEvent::SocketClosed { kind, device_id } => {
            let lost = state
                .session
                .current()
                .is_some_and(|s| s.device_id() == device_id && s.kind == kind && s.phase == SessionPhase::Open);
            if lost {
                warn!("{} socket to #{} closed", kind, device_id);
                state.banner = Some(CONNECTION_LOST_BANNER.to_string());
            }
            UpdateResult::none()
        }
        TransportEvent::BrokerConnected { link } => handle_broker_connected(state, link),
        TransportEvent::BrokerDisconnected { link, reason } => {
            if link < state.broker.link {
                return UpdateResult::none();
            }
            state.broker.link = link;
            state.broker.connected = false;
            debug!("Broker link {} down: {}", link, reason);
            let on_mqtt = state
                .session
                .current()
                .is_some_and(|s| s.kind == ConnectionKind::Mqtt);
            if on_mqtt {
                state.banner = Some(CONNECTION_LOST_BANNER.to_string());
            }
            UpdateResult::none()
        }
    }
}

fn handle_broker_connected(state: &mut AppState, link: u64) -> UpdateResult {
    if link < state.broker.link {
        debug!("Ignoring stale broker link {}", link);
        return UpdateResult::none();
    }
    state.broker.link = link;

    // Disabled while the link was coming up
    if !state.config.use_mqtt() {
        state.broker.connected = false;
        return UpdateResult::action(UpdateAction::StopBroker);
    }

    state.broker.connected = true;
    info!("MQTT connected (link {})", link);
    UpdateResult::none()
}

fn handle_inbound(state: &mut AppState, kind: ConnectionKind, message: Inbound) -> UpdateResult {
    mark_alive(state, message.device_id());

    match message {
        Inbound::Discover(reply) => handle_discover_reply(state, kind, reply),
        Inbound::Controls { id, controls } => {
            state.runtime_mut(&id).controls = Some(controls.clone());
            show_if_focused(state, id, PayloadKind::Controls, controls, Screen::Device);
            UpdateResult::none()
        }
        Inbound::Info { id, body } => {
            show_if_focused(state, id, PayloadKind::Info, body, Screen::Info);
            UpdateResult::none()
        }
        Inbound::Fsbr { id, body } => {
            show_if_focused(state, id, PayloadKind::Fsbr, body, Screen::Fsbr);
            UpdateResult::none()
        }
        Inbound::Other { id, kind, body } => {
            if state.session.is_focused(&id) {
                let body = match body {
                    Value::Object(mut obj) => {
                        obj.insert("type".into(), Value::String(kind));
                        Value::Object(obj)
                    }
                    other => other,
                };
                state.notify(Notice::Payload(Payload {
                    device_id: id,
                    kind: PayloadKind::Other,
                    body,
                }));
            }
            UpdateResult::none()
        }
    }
}

/// Merge a discovery reply; the last transport to answer wins
fn handle_discover_reply(state: &mut AppState, kind: ConnectionKind, reply: DiscoverReply) -> UpdateResult {
    let DiscoverReply { id, device } = reply;
    let outcome = state.devices.merge(&id, device);
    state.runtime_mut(&id).conn = kind;
    debug!("Discovered #{} via {} ({:?})", id, kind, outcome);
    state.notify(Notice::DeviceUpdated(id));

    UpdateResult::action(UpdateAction::Persist {
        config: None,
        devices: Some(state.devices.clone()),
    })
}

/// Forward a payload only if it belongs to the focused device and screen
fn show_if_focused(state: &mut AppState, id: String, kind: PayloadKind, body: Value, screen: Screen) {
    if !state.session.is_focused(&id) || state.screen != screen {
        trace!("Dropping {:?} payload from #{}", kind, id);
        return;
    }
    state.notify(Notice::Payload(Payload {
        device_id: id,
        kind,
        body,
    }));
}

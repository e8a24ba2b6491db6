//! Session lifecycle handlers: open, close, PIN gate, liveness, deletion

use hubdeck_core::pin_matches;
use hubdeck_core::prelude::*;
use hubdeck_transport::Query;

use crate::message::Message;
use crate::session::SessionPhase;
use crate::state::{AppState, Notice, PinTarget, Screen};

use super::navigation::{enter_main, show_controls};
use super::{UpdateAction, UpdateResult};

/// Banner shown when the focused device stops answering pings
pub const NO_RESPONSE_BANNER: &str = "Device is not responding";

/// Banner shown when the focused device's link drops
pub const CONNECTION_LOST_BANNER: &str = "Connection lost";

/// Drop the live session, returning the transport teardown to perform.
///
/// Returns `None` when no session exists, so repeated calls are no-ops.
pub(crate) fn close_session(state: &mut AppState) -> Option<UpdateAction> {
    let session = state.session.close()?;
    state.cli_open = false;
    info!(
        "Close device #{} via {}",
        session.device_id(),
        session.kind
    );
    Some(UpdateAction::CloseSession {
        target: session.target,
        kind: session.kind,
    })
}

pub(crate) fn handle_close(state: &mut AppState) -> UpdateResult {
    let action = close_session(state);
    if state.screen.needs_focus() {
        enter_main(state);
    }
    UpdateResult::maybe_action(action)
}

/// User picked a device: offline devices are offered for deletion
pub(crate) fn handle_select_device(state: &mut AppState, id: String) -> UpdateResult {
    if state.discovery.in_flight {
        debug!("Select #{} ignored: discovery in flight", id);
        return UpdateResult::none();
    }
    if !state.devices.contains(&id) {
        return UpdateResult::none();
    }
    if !state.conn(&id).is_online() {
        state.notify(Notice::PromptDelete(id));
        return UpdateResult::none();
    }
    UpdateResult::message(Message::OpenDevice { id })
}

pub(crate) fn handle_open_device(state: &mut AppState, id: String) -> UpdateResult {
    if state.discovery.in_flight {
        debug!("Open #{} refused: discovery in flight", id);
        return UpdateResult::none();
    }

    let Some(device) = state.devices.get(&id) else {
        debug!("Open #{} refused: unknown device", id);
        return UpdateResult::none();
    };

    let needs_pin = device.has_pin() && !state.is_granted(&id);

    // The previous session must be fully closed first, PIN gate included
    if !state.session.is_closed() {
        let action = close_session(state);
        return UpdateResult::then(action, Message::OpenDevice { id });
    }

    if needs_pin {
        state.pin_target = Some(PinTarget::Device(id));
        state.menu_open = false;
        state.screen = Screen::Pin;
        return UpdateResult::none();
    }

    let kind = state.conn(&id);
    if !kind.is_online() {
        debug!("Open #{} refused: device is offline", id);
        return UpdateResult::none();
    }

    let Some(target) = state.target_for(&id) else {
        return UpdateResult::none();
    };
    let Some(generation) = state.session.begin_open(target.clone(), kind) else {
        return UpdateResult::none();
    };

    info!("Open device #{} via {}", id, kind);
    state.pin_target = None;
    state.menu_open = false;
    state.screen = Screen::Device;
    show_controls(state);

    UpdateResult::action(UpdateAction::OpenSession {
        target,
        kind,
        generation,
        liveness: state.settings.liveness_interval(),
    })
}

pub(crate) fn handle_link_result(
    state: &mut AppState,
    generation: u64,
    result: std::result::Result<(), String>,
) -> UpdateResult {
    if !state.session.is_current(generation) {
        debug!("Dropping link result of closed session {}", generation);
        return UpdateResult::none();
    }
    state.session.mark_open(generation);
    if let Err(e) = result {
        warn!("Session {} link failed: {}", generation, e);
        state.banner = Some(CONNECTION_LOST_BANNER.to_string());
    }
    UpdateResult::none()
}

/// Keypad digits; a mismatch is silent
pub(crate) fn handle_enter_pin(state: &mut AppState, digits: String) -> UpdateResult {
    match state.pin_target.clone() {
        Some(PinTarget::App) => {
            if !pin_matches(&digits, state.config.hub_pin_hash()) {
                return UpdateResult::none();
            }
            state.app_locked = false;
            state.pin_target = None;
            UpdateResult::message(Message::StartupUnlocked)
        }
        Some(PinTarget::Device(id)) => {
            let stored = state.devices.get(&id).map(|d| d.pin).unwrap_or(0);
            if !pin_matches(&digits, stored) {
                return UpdateResult::none();
            }
            state.runtime_mut(&id).granted = true;
            state.pin_target = None;
            UpdateResult::message(Message::OpenDevice { id })
        }
        None => UpdateResult::none(),
    }
}

/// One liveness period elapsed for session `generation`
pub(crate) fn handle_liveness_tick(state: &mut AppState, generation: u64) -> UpdateResult {
    let Some(session) = state.session.current_mut() else {
        return UpdateResult::none();
    };
    if session.generation != generation || session.phase != SessionPhase::Open {
        return UpdateResult::none();
    }

    let missed = session.awaiting_reply;
    session.awaiting_reply = true;
    let action = UpdateAction::QueryDevice {
        target: session.target.clone(),
        kind: session.kind,
        query: Query::Ping,
    };

    if missed {
        state.banner = Some(NO_RESPONSE_BANNER.to_string());
    }
    UpdateResult::action(action)
}

/// A message arrived from `id`; clears a pending ping on the focused device
pub(crate) fn mark_alive(state: &mut AppState, id: &str) {
    if let Some(session) = state.session.current_mut() {
        if session.device_id() == id && session.awaiting_reply {
            session.awaiting_reply = false;
            if state.banner.as_deref() == Some(NO_RESPONSE_BANNER) {
                state.banner = None;
            }
        }
    }
}

pub(crate) fn handle_delete_device(state: &mut AppState, id: String) -> UpdateResult {
    if state.session.is_focused(&id) {
        let action = close_session(state);
        if state.screen.needs_focus() {
            enter_main(state);
        }
        return UpdateResult::then(action, Message::DeleteDevice { id });
    }

    if state.devices.remove(&id).is_none() {
        return UpdateResult::none();
    }
    state.runtime.remove(&id);
    info!("Deleted device #{}", id);
    state.notify(Notice::DeviceRemoved(id));
    UpdateResult::action(UpdateAction::Persist {
        config: None,
        devices: Some(state.devices.clone()),
    })
}

pub(crate) fn handle_clear_devices(state: &mut AppState) -> UpdateResult {
    if !state.session.is_closed() {
        let action = close_session(state);
        return UpdateResult::then(action, Message::ClearDevices);
    }

    for id in state.devices.ids() {
        state.notify(Notice::DeviceRemoved(id));
    }
    state.devices.clear();
    state.runtime.clear();
    enter_main(state);
    UpdateResult::action(UpdateAction::Persist {
        config: None,
        devices: Some(state.devices.clone()),
    })
}

//! Main update function - handles state transitions (TEA pattern)
//!
//! Handler implementations live in the sibling modules; this file only
//! dispatches and holds the small lifecycle handlers.

use serde_json::Value;

use hubdeck_core::prelude::*;

use crate::config::keys;
use crate::message::Message;
use crate::session::SessionPhase;
use crate::state::{AppState, Notice, PinTarget, Screen};

use super::session::{close_session, CONNECTION_LOST_BANNER};
use super::{config, discovery, navigation, session, transport, UpdateResult};

/// Process a message and update state
/// Returns optional follow-up message and/or action
pub fn update(state: &mut AppState, message: Message) -> UpdateResult {
    if state.app_locked && !allowed_while_locked(&message) {
        debug!("Dropping {:?} while the app is locked", message);
        return UpdateResult::none();
    }

    match message {
        // ─────────────────────────────────────────────────────────
        // Lifecycle
        // ─────────────────────────────────────────────────────────
        Message::Startup => handle_startup(state),
        Message::StartupUnlocked => handle_startup_unlocked(state),
        Message::Quit => {
            let action = close_session(state);
            state.request_quit();
            UpdateResult::maybe_action(action)
        }

        // ─────────────────────────────────────────────────────────
        // Navigation
        // ─────────────────────────────────────────────────────────
        Message::Back => navigation::handle_back(state),
        Message::Refresh => navigation::handle_refresh(state),
        Message::ToggleMenu => navigation::handle_toggle_menu(state),
        Message::OpenInfo => navigation::open_device_page(state, Screen::Info),
        Message::OpenFsbr => navigation::open_device_page(state, Screen::Fsbr),
        Message::OpenConfig => navigation::open_page(state, Screen::Config),
        Message::OpenTest => navigation::open_page(state, Screen::Test),
        Message::OpenProjects => navigation::open_page(state, Screen::Projects),
        Message::ToggleCli => navigation::handle_toggle_cli(state),
        Message::SendCli { text } => navigation::handle_send_cli(state, text),

        // ─────────────────────────────────────────────────────────
        // Devices & sessions
        // ─────────────────────────────────────────────────────────
        Message::SelectDevice { id } => session::handle_select_device(state, id),
        Message::OpenDevice { id } => session::handle_open_device(state, id),
        Message::CloseSession => session::handle_close(state),
        Message::EnterPin { digits } => session::handle_enter_pin(state, digits),
        Message::DeleteDevice { id } => session::handle_delete_device(state, id),
        Message::ClearDevices => session::handle_clear_devices(state),
        Message::Discover => discovery::handle_discover(state),
        Message::DiscoverAll => discovery::handle_discover_all(state),

        // ─────────────────────────────────────────────────────────
        // Configuration
        // ─────────────────────────────────────────────────────────
        Message::SetConfig { key, value } => config::handle_set_config(state, key, value),
        Message::SaveConfig => config::handle_save_config(state),
        Message::Export => config::handle_export(state),
        Message::Import { blob } => config::handle_import(state, blob),

        // ─────────────────────────────────────────────────────────
        // Timers
        // ─────────────────────────────────────────────────────────
        Message::ReconnectTick => handle_reconnect_tick(state),
        Message::LivenessTick { generation } => session::handle_liveness_tick(state, generation),
        Message::DiscoveryWindowElapsed { pass } => discovery::handle_window_elapsed(state, pass),

        // ─────────────────────────────────────────────────────────
        // Transport results
        // ─────────────────────────────────────────────────────────
        Message::Transport(event) => transport::handle_transport_event(state, event),
        Message::SessionLinkResult { generation, result } => {
            session::handle_link_result(state, generation, result)
        }
        Message::TransportFailed {
            kind,
            operation,
            error,
        } => {
            let affects_session = state
                .session
                .current()
                .is_some_and(|s| s.kind == kind && s.phase == SessionPhase::Open);
            if affects_session && operation != "discover" {
                state.banner = Some(CONNECTION_LOST_BANNER.to_string());
            }
            debug!("{} {} failed: {}", kind, operation, error);
            UpdateResult::none()
        }
    }
}

/// Only the keypad, quit, timers and transport results get through the app lock
fn allowed_while_locked(message: &Message) -> bool {
    matches!(
        message,
        Message::Startup
            | Message::Quit
            | Message::EnterPin { .. }
            | Message::ReconnectTick
            | Message::LivenessTick { .. }
            | Message::DiscoveryWindowElapsed { .. }
            | Message::Transport(_)
            | Message::SessionLinkResult { .. }
            | Message::TransportFailed { .. }
    )
}

fn handle_startup(state: &mut AppState) -> UpdateResult {
    if state.host.embedded_host.is_some() {
        state.config.set(keys::USE_WS, Value::Bool(true));
    }
    if state.show_changelog {
        state.notify(Notice::Changelog);
    }

    if state.config.use_pin() && state.config.hub_pin_hash() != 0 {
        info!("App locked, waiting for PIN");
        state.app_locked = true;
        state.pin_target = Some(PinTarget::App);
        state.screen = Screen::Pin;
        return UpdateResult::none();
    }
    UpdateResult::message(Message::StartupUnlocked)
}

fn handle_startup_unlocked(state: &mut AppState) -> UpdateResult {
    state.started = true;
    state.config_revision += 1;
    navigation::enter_main(state);

    let broker = if state.config.use_mqtt() {
        config::start_broker(state)
    } else {
        None
    };
    UpdateResult::then(broker, Message::Discover)
}

/// Fixed-period broker supervisor: one attempt per tick while disconnected
fn handle_reconnect_tick(state: &mut AppState) -> UpdateResult {
    if !state.started || state.app_locked {
        return UpdateResult::none();
    }
    if !state.config.use_mqtt() || state.broker.connected {
        return UpdateResult::none();
    }
    let Some(action) = config::start_broker(state) else {
        return UpdateResult::none();
    };
    state.broker.attempts += 1;
    info!("MQTT reconnect (attempt {})", state.broker.attempts);
    UpdateResult::action(action)
}


//! Screen navigation handlers

use hubdeck_core::prelude::*;
use hubdeck_transport::Query;

use crate::message::Message;
use crate::state::{AppState, Notice, Payload, PayloadKind, Screen};

use super::session::close_session;
use super::{UpdateAction, UpdateResult};

/// Switch to MAIN; clears the banner and closes the overlays
pub(crate) fn enter_main(state: &mut AppState) {
    state.screen = Screen::Main;
    state.menu_open = false;
    state.cli_open = false;
    state.banner = None;
}

/// Hand the focused device's last controls to the presentation layer
pub(crate) fn show_controls(state: &mut AppState) {
    let Some(id) = state.session.focused().cloned() else {
        return;
    };
    if let Some(controls) = state.runtime.get(&id).and_then(|r| r.controls.clone()) {
        state.notify(Notice::Payload(Payload {
            device_id: id,
            kind: PayloadKind::Controls,
            body: controls,
        }));
    }
}

pub(crate) fn handle_back(state: &mut AppState) -> UpdateResult {
    if state.menu_open {
        state.menu_open = false;
        return UpdateResult::none();
    }

    match state.screen {
        Screen::Device => {
            let action = close_session(state);
            enter_main(state);
            UpdateResult::maybe_action(action)
        }
        Screen::Info | Screen::Fsbr => {
            state.screen = Screen::Device;
            show_controls(state);
            UpdateResult::none()
        }
        Screen::Config => leave_config(state),
        Screen::Pin => {
            if state.app_locked {
                debug!("Back ignored while the app is locked");
                return UpdateResult::none();
            }
            state.pin_target = None;
            enter_main(state);
            UpdateResult::none()
        }
        Screen::Projects | Screen::Test => {
            enter_main(state);
            UpdateResult::none()
        }
        Screen::Main => UpdateResult::none(),
    }
}

/// Leave CONFIG: persist if edited, return to MAIN, rediscover
pub(crate) fn leave_config(state: &mut AppState) -> UpdateResult {
    let persist = state.config_changed.then(|| UpdateAction::Persist {
        config: Some(state.config.clone()),
        devices: None,
    });
    state.config_changed = false;
    enter_main(state);
    UpdateResult::then(persist, Message::Discover)
}

pub(crate) fn handle_refresh(state: &mut AppState) -> UpdateResult {
    match state.screen {
        Screen::Device => query_focused(state, Query::Focus),
        Screen::Info => query_focused(state, Query::Info),
        Screen::Fsbr => query_focused(state, Query::Fsbr),
        _ => UpdateResult::message(Message::Discover),
    }
}

/// Send `query` to the focused device, if there is one
pub(crate) fn query_focused(state: &AppState, query: Query) -> UpdateResult {
    match state.session.current() {
        Some(session) => UpdateResult::action(UpdateAction::QueryDevice {
            target: session.target.clone(),
            kind: session.kind,
            query,
        }),
        None => {
            debug!("No focused device for {:?}", query);
            UpdateResult::none()
        }
    }
}

pub(crate) fn handle_toggle_menu(state: &mut AppState) -> UpdateResult {
    state.menu_open = !state.menu_open;
    UpdateResult::none()
}

/// Enter INFO or FSBR and request the screen's payload
pub(crate) fn open_device_page(state: &mut AppState, screen: Screen) -> UpdateResult {
    if state.session.is_closed() {
        debug!("{} needs a focused device", screen);
        return UpdateResult::none();
    }
    state.menu_open = false;
    state.screen = screen;
    let query = if screen == Screen::Fsbr {
        Query::Fsbr
    } else {
        Query::Info
    };
    query_focused(state, query)
}

/// Enter a screen that has no focused device, closing any session first
pub(crate) fn open_page(state: &mut AppState, screen: Screen) -> UpdateResult {
    if screen == Screen::Config && state.screen == Screen::Config {
        return leave_config(state);
    }
    if state.app_locked {
        return UpdateResult::none();
    }
    let action = close_session(state);
    state.menu_open = false;
    state.cli_open = false;
    if screen == Screen::Config {
        state.config_changed = false;
    }
    state.pin_target = None;
    state.screen = screen;
    UpdateResult::maybe_action(action)
}

pub(crate) fn handle_toggle_cli(state: &mut AppState) -> UpdateResult {
    if state.session.is_closed() {
        debug!("CLI overlay needs a focused device");
        return UpdateResult::none();
    }
    state.cli_open = !state.cli_open;
    UpdateResult::none()
}

pub(crate) fn handle_send_cli(state: &mut AppState, text: String) -> UpdateResult {
    query_focused(state, Query::Cli(text))
}

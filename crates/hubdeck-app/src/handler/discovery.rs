//! Discovery pass handlers
//!
//! A pass resets every known device to offline, then asks each enabled and
//! eligible transport to broadcast. Replies are merged whenever they arrive;
//! the window only decides how long device selection stays blocked.

use hubdeck_core::prelude::*;
use hubdeck_core::ConnectionKind;
use hubdeck_transport::{DiscoverRequest, DiscoverScope, Subnet};

use crate::config::Config;
use crate::message::Message;
use crate::state::{AppState, HostContext, Notice, Screen};

use super::navigation::enter_main;
use super::session::close_session;
use super::{UpdateAction, UpdateResult};

/// Transports a discovery pass may use under `config` on `host`
///
/// Plain WebSocket is skipped on a secure origin (mixed content).
pub(crate) fn eligible_kinds(config: &Config, host: &HostContext) -> Vec<ConnectionKind> {
    ConnectionKind::TRANSPORTS
        .into_iter()
        .filter(|kind| match kind {
            ConnectionKind::Serial => config.use_serial(),
            ConnectionKind::Bluetooth => config.use_bt(),
            ConnectionKind::WebSocket => config.use_ws() && !host.secure_origin,
            ConnectionKind::Mqtt => config.use_mqtt(),
            ConnectionKind::None => false,
        })
        .collect()
}

/// Start a new pass with `scope`
pub(crate) fn start_discovery(state: &mut AppState, scope: DiscoverScope) -> UpdateResult {
    for id in state.devices.ids() {
        state.runtime_mut(&id).conn = ConnectionKind::None;
        state.notify(Notice::DeviceUpdated(id));
    }

    state.discovery.pass += 1;
    state.discovery.in_flight = true;
    let pass = state.discovery.pass;

    let mut known_hosts: Vec<_> = state.devices.iter().filter_map(|(_, d)| d.address()).collect();
    if let Some(host) = state.host.embedded_host {
        // The serving hub is probed even before it is registered
        known_hosts.push(host);
    }

    let subnet = match scope {
        DiscoverScope::All => Subnet::from_client(&state.config.client_ip(), state.config.netmask()),
        DiscoverScope::Nearby => None,
    };

    let kinds = eligible_kinds(&state.config, &state.host);
    debug!("Discovery pass {} ({:?}) on {:?}", pass, scope, kinds);

    UpdateResult::action(UpdateAction::Discover {
        request: DiscoverRequest {
            scope,
            prefix: state.config.prefix(),
            hub_id: state.config.hub_id(),
            known_hosts,
            subnet,
        },
        kinds,
        pass,
        window: state.settings.discovery_window(),
    })
}

pub(crate) fn handle_discover(state: &mut AppState) -> UpdateResult {
    start_discovery(state, DiscoverScope::Nearby)
}

/// Broadcast on every transport, then return to MAIN
pub(crate) fn handle_discover_all(state: &mut AppState) -> UpdateResult {
    if !state.session.is_closed() {
        let action = close_session(state);
        return UpdateResult::then(action, Message::DiscoverAll);
    }
    if state.screen == Screen::Config && state.config_changed {
        state.config_changed = false;
        let persist = UpdateAction::Persist {
            config: Some(state.config.clone()),
            devices: None,
        };
        return UpdateResult::then(Some(persist), Message::DiscoverAll);
    }
    enter_main(state);
    start_discovery(state, DiscoverScope::All)
}

pub(crate) fn handle_window_elapsed(state: &mut AppState, pass: u64) -> UpdateResult {
    if pass != state.discovery.pass {
        trace!("Ignoring window of old pass {}", pass);
        return UpdateResult::none();
    }
    state.discovery.in_flight = false;
    debug!("Discovery pass {} closed", pass);
    UpdateResult::none()
}

//! Config edit, broker control and export/import handlers

use serde_json::Value;

use hubdeck_core::prelude::*;
use hubdeck_core::string_hash;
use hubdeck_transport::BrokerOptions;

use crate::config::{keys, transfer};
use crate::message::Message;
use crate::state::{AppState, Notice, Screen};

use super::{UpdateAction, UpdateResult};

/// Broker link options from the current config; `None` if unusable
pub(crate) fn broker_options(state: &AppState) -> Option<BrokerOptions> {
    let host = state.config.mq_host();
    if host.trim().is_empty() {
        warn!("MQTT enabled but no broker host configured");
        return None;
    }
    let Some(port) = state.config.mq_port() else {
        warn!("MQTT port {:?} is not a valid port", state.config.get(keys::MQ_PORT));
        return None;
    };
    Some(BrokerOptions {
        host,
        port,
        login: state.config.mq_login(),
        pass: state.config.mq_pass(),
        prefix: state.config.prefix(),
        hub_id: state.config.hub_id(),
        transport: state.settings.mqtt.transport,
        keep_alive: state.settings.keep_alive(),
    })
}

pub(crate) fn start_broker(state: &AppState) -> Option<UpdateAction> {
    broker_options(state).map(|options| UpdateAction::StartBroker { options })
}

pub(crate) fn handle_set_config(state: &mut AppState, key: String, value: Value) -> UpdateResult {
    let value = match (key.as_str(), value) {
        // The app PIN is only ever stored hashed
        (keys::HUB_PIN, Value::String(digits)) if !digits.is_empty() => {
            Value::from(i64::from(string_hash(&digits)))
        }
        (_, Value::String(text)) => Value::String(text.trim().to_string()),
        (_, other) => other,
    };

    if !state.config.set(key.clone(), value) {
        return UpdateResult::none();
    }
    state.config_revision += 1;
    debug!("Config {} changed", key);

    let save = if state.screen == Screen::Config {
        state.config_changed = true;
        None
    } else {
        Some(Message::SaveConfig)
    };

    let broker = if key == keys::USE_MQTT {
        if state.config.use_mqtt() {
            start_broker(state)
        } else {
            state.broker.connected = false;
            Some(UpdateAction::StopBroker)
        }
    } else if keys::BROKER_KEYS.contains(&key.as_str()) && state.config.use_mqtt() {
        state.broker.connected = false;
        start_broker(state)
    } else {
        None
    };

    UpdateResult {
        message: save,
        action: broker,
    }
}

pub(crate) fn handle_save_config(state: &mut AppState) -> UpdateResult {
    UpdateResult::action(UpdateAction::Persist {
        config: Some(state.config.clone()),
        devices: None,
    })
}

pub(crate) fn handle_export(state: &mut AppState) -> UpdateResult {
    match transfer::export(&state.config, &state.devices) {
        Ok(blob) => state.notify(Notice::ExportReady(blob)),
        Err(e) => warn!("Export failed: {}", e),
    }
    UpdateResult::none()
}

/// Apply whichever halves of `blob` decode; the rest stays as it was
pub(crate) fn handle_import(state: &mut AppState, blob: String) -> UpdateResult {
    let imported = transfer::import(&blob);
    if imported.config.is_none() && imported.devices.is_none() {
        warn!("Import: nothing decoded");
        return UpdateResult::none();
    }

    if let Some(config) = &imported.config {
        state.config = config.clone();
        state.config_revision += 1;
        info!("Import: config applied");
    }

    if let Some(devices) = &imported.devices {
        for id in state.devices.ids() {
            if !devices.contains(&id) {
                state.notify(Notice::DeviceRemoved(id));
            }
        }
        state.devices = devices.clone();
        state.runtime.retain(|id, _| devices.contains(id));
        for id in devices.ids() {
            state.notify(Notice::DeviceUpdated(id));
        }
        info!("Import: {} device(s) applied", devices.len());
    }

    UpdateResult::action(UpdateAction::Persist {
        config: imported.config,
        devices: imported.devices,
    })
}

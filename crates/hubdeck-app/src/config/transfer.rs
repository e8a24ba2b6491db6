//! Export/import blob
//!
//! Format: `base64(JSON(config)) + "," + base64(percent_encode(JSON(devices)))`,
//! where the percent encoding matches what a browser's `encodeURIComponent`
//! produces. The two halves decode independently: a broken half is dropped and
//! the other one still applies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use hubdeck_core::prelude::*;
use hubdeck_core::DeviceRegistry;

use super::types::Config;

/// Characters `encodeURIComponent` escapes
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Build the export blob
pub fn export(config: &Config, devices: &DeviceRegistry) -> Result<String> {
    let config_json = serde_json::to_string(config)?;
    let devices_json = serde_json::to_string(devices)?;
    let devices_escaped = utf8_percent_encode(&devices_json, URI_COMPONENT).to_string();
    Ok(format!(
        "{},{}",
        STANDARD.encode(config_json),
        STANDARD.encode(devices_escaped)
    ))
}

/// Independently decoded halves of an import blob
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Imported {
    pub config: Option<Config>,
    pub devices: Option<DeviceRegistry>,
}

/// Decode both halves of `blob`; a half that fails to decode is `None`
pub fn import(blob: &str) -> Imported {
    let mut halves = blob.trim().splitn(2, ',');
    let config_half = halves.next().unwrap_or_default();
    let devices_half = halves.next();

    let config = decode_config(config_half)
        .map_err(|e| warn!("Import: config half rejected: {}", e))
        .ok();

    let devices = match devices_half {
        Some(half) => decode_devices(half)
            .map_err(|e| warn!("Import: devices half rejected: {}", e))
            .ok(),
        None => {
            warn!("Import: blob has no devices half");
            None
        }
    };

    Imported { config, devices }
}

fn decode_config(half: &str) -> Result<Config> {
    let bytes = STANDARD
        .decode(half.trim())
        .map_err(|e| Error::decode("config", e))?;
    match serde_json::from_slice::<Value>(&bytes).map_err(|e| Error::decode("config", e))? {
        Value::Object(map) => Ok(Config::from_map(map)),
        _ => Err(Error::decode("config", "not a JSON object")),
    }
}

fn decode_devices(half: &str) -> Result<DeviceRegistry> {
    let bytes = STANDARD
        .decode(half.trim())
        .map_err(|e| Error::decode("device registry", e))?;
    let escaped = String::from_utf8(bytes).map_err(|e| Error::decode("device registry", e))?;
    let json = percent_decode_str(&escaped)
        .decode_utf8()
        .map_err(|e| Error::decode("device registry", e))?;
    serde_json::from_str(&json).map_err(|e| Error::decode("device registry", e))
}

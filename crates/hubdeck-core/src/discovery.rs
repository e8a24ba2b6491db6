//! Inbound device message classification
//!
//! Every message a hub sends back is a JSON object carrying a `type` field.
//! Discovery replies describe the device itself; everything else is an opaque
//! payload routed to the screen that asked for it.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{Device, DeviceId};

/// A device announcing itself in response to a discovery request
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverReply {
    pub id: DeviceId,
    pub device: Device,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `type == "discover"`
    Discover(DiscoverReply),
    /// `type == "ui"`: control descriptors for the focused view
    Controls { id: DeviceId, controls: Value },
    /// `type == "info"`
    Info { id: DeviceId, body: Value },
    /// `type == "fsbr"`
    Fsbr { id: DeviceId, body: Value },
    /// Any other type (ping acks, cli echo, value updates, ...)
    Other {
        id: DeviceId,
        kind: String,
        body: Value,
    },
}

impl Inbound {
    /// Device the message came from
    pub fn device_id(&self) -> &str {
        match self {
            Inbound::Discover(reply) => &reply.id,
            Inbound::Controls { id, .. }
            | Inbound::Info { id, .. }
            | Inbound::Fsbr { id, .. }
            | Inbound::Other { id, .. } => id,
        }
    }
}

/// Parse one inbound text frame or MQTT payload.
///
/// `fallback_id` is the device id known from the channel (topic or socket)
/// and is used when the body does not carry an `id` of its own. Hub firmware
/// writes its objects with single quotes; those are accepted too.
pub fn parse_inbound(text: &str, fallback_id: Option<&str>) -> Result<Inbound> {
    let text = text.trim();
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) if text.contains('\'') => {
            serde_json::from_str(&normalize_quotes(text)).map_err(|_| e)?
        }
        Err(e) => return Err(e.into()),
    };
    let Value::Object(mut obj) = value else {
        return Err(Error::decode("device message", "not a JSON object"));
    };

    let kind = match obj.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(Error::decode("device message", "missing 'type'")),
    };

    let id = match obj.get("id").and_then(value_as_id) {
        Some(id) => id,
        None => fallback_id
            .map(str::to_string)
            .ok_or_else(|| Error::decode("device message", "missing 'id'"))?,
    };

    let inbound = match kind.as_str() {
        "discover" => {
            obj.remove("id");
            let device = device_from_fields(obj)?;
            Inbound::Discover(DiscoverReply { id, device })
        }
        "ui" => Inbound::Controls {
            id,
            controls: obj.remove("controls").unwrap_or(Value::Object(obj)),
        },
        "info" => Inbound::Info {
            id,
            body: Value::Object(obj),
        },
        "fsbr" => Inbound::Fsbr {
            id,
            body: Value::Object(obj),
        },
        _ => Inbound::Other {
            id,
            kind,
            body: Value::Object(obj),
        },
    };
    Ok(inbound)
}

/// Rewrite single-quoted strings as JSON strings; double-quoted ones pass through
fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push('"');
            }
            (Some(q), '\\') => match chars.next() {
                Some('\'') if q == '\'' => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            (Some('\''), '"') => out.push_str("\\\""),
            (Some(q), c) if c == q => {
                quote = None;
                out.push('"');
            }
            (_, c) => out.push(c),
        }
    }
    out
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn device_from_fields(obj: Map<String, Value>) -> Result<Device> {
    serde_json::from_value(Value::Object(obj)).map_err(|e| Error::decode("discover reply", e))
}

//! MQTT topic grammar and device command strings
//!
//! Layout used by hub firmware:
//! - `{prefix}/{device}/set/*`          external writes to a device
//! - `{prefix}/{device}/read/*`         external reads from a device
//! - `{prefix}/hub/{device}/get/*`      value broadcasts from a device
//! - `{prefix}/hub/{device}/status`     online/offline status
//! - `{prefix}/hub/{hub_id}/{device}`   replies addressed to one client
//! - `{prefix}/{device}/{hub_id}/{cmd}` commands from a client to a device

/// Commands a client sends to a focused device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Focus,
    Unfocus,
    Info,
    Fsbr,
    Ping,
    Cli,
}

impl DeviceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCommand::Focus => "focus",
            DeviceCommand::Unfocus => "unfocus",
            DeviceCommand::Info => "info",
            DeviceCommand::Fsbr => "fsbr",
            DeviceCommand::Ping => "ping",
            DeviceCommand::Cli => "cli",
        }
    }
}

pub fn set_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/{device_id}/set/*")
}

pub fn read_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/{device_id}/read/*")
}

pub fn get_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/hub/{device_id}/get/*")
}

pub fn status_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/hub/{device_id}/status")
}

/// Wildcard subscription covering every inbound hub topic
pub fn hub_subscription(prefix: &str) -> String {
    format!("{prefix}/hub/#")
}

/// Broadcast discovery topic; the payload is the hub id
pub fn discover_topic(prefix: &str) -> String {
    prefix.to_string()
}

/// Command string, used as MQTT topic or WebSocket text frame
pub fn command(prefix: &str, device_id: &str, hub_id: &str, cmd: DeviceCommand) -> String {
    format!("{prefix}/{device_id}/{hub_id}/{}", cmd.as_str())
}

/// Command carrying a named value, e.g. the CLI line
///
/// Over MQTT this is the topic and the value travels as payload; over a
/// WebSocket the frame is `{topic}={value}`.
pub fn named_command(
    prefix: &str,
    device_id: &str,
    hub_id: &str,
    cmd: DeviceCommand,
    name: &str,
) -> String {
    format!("{}/{name}", command(prefix, device_id, hub_id, cmd))
}

/// The four topics shown on the info screen for a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoTopics {
    pub set: String,
    pub read: String,
    pub get: String,
    pub status: String,
}

impl InfoTopics {
    pub fn for_device(prefix: &str, device_id: &str) -> Self {
        Self {
            set: set_topic(prefix, device_id),
            read: read_topic(prefix, device_id),
            get: get_topic(prefix, device_id),
            status: status_topic(prefix, device_id),
        }
    }
}

/// An inbound topic under `{prefix}/hub/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubTopic<'a> {
    /// Reply addressed to this client
    Reply { device_id: &'a str },
    /// Device online/offline status
    Status { device_id: &'a str },
    /// Value broadcast for a named control
    Get { device_id: &'a str, name: &'a str },
}

/// Parse an inbound topic; `None` for anything outside the grammar
///
/// Replies to this client are matched first, so a device can never shadow the
/// reply channel by reporting an id equal to the hub id.
pub fn parse_hub_topic<'a>(prefix: &str, hub_id: &str, topic: &'a str) -> Option<HubTopic<'a>> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix("/hub/")?;
    let mut parts = rest.splitn(3, '/');
    let first = parts.next().filter(|s| !s.is_empty())?;
    let second = parts.next().filter(|s| !s.is_empty())?;
    let tail = parts.next();

    if first == hub_id && tail.is_none() {
        return Some(HubTopic::Reply { device_id: second });
    }

    match (second, tail) {
        ("status", None) => Some(HubTopic::Status { device_id: first }),
        ("get", Some(name)) if !name.is_empty() => Some(HubTopic::Get {
            device_id: first,
            name,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_topics_layout() {
        let topics = InfoTopics::for_device("MyDevices", "a1b2");
        assert_eq!(topics.set, "MyDevices/a1b2/set/*");
        assert_eq!(topics.read, "MyDevices/a1b2/read/*");
        assert_eq!(topics.get, "MyDevices/hub/a1b2/get/*");
        assert_eq!(topics.status, "MyDevices/hub/a1b2/status");
    }

    #[test]
    fn test_command_string() {
        assert_eq!(
            command("MyDevices", "a1b2", "3f9c", DeviceCommand::Focus),
            "MyDevices/a1b2/3f9c/focus"
        );
        assert_eq!(
            command("MyDevices", "a1b2", "3f9c", DeviceCommand::Unfocus),
            "MyDevices/a1b2/3f9c/unfocus"
        );
    }

    #[test]
    fn test_named_command_appends_name() {
        assert_eq!(
            named_command("MyDevices", "a1b2", "3f9c", DeviceCommand::Cli, "cli"),
            "MyDevices/a1b2/3f9c/cli/cli"
        );
    }

    #[test]
    fn test_parse_reply_topic() {
        assert_eq!(
            parse_hub_topic("MyDevices", "3f9c", "MyDevices/hub/3f9c/a1b2"),
            Some(HubTopic::Reply { device_id: "a1b2" })
        );
    }

    #[test]
    fn test_parse_status_and_get_topics() {
        assert_eq!(
            parse_hub_topic("MyDevices", "3f9c", "MyDevices/hub/a1b2/status"),
            Some(HubTopic::Status { device_id: "a1b2" })
        );
        assert_eq!(
            parse_hub_topic("MyDevices", "3f9c", "MyDevices/hub/a1b2/get/led"),
            Some(HubTopic::Get {
                device_id: "a1b2",
                name: "led"
            })
        );
    }

    #[test]
    fn test_parse_rejects_foreign_topics() {
        assert_eq!(parse_hub_topic("MyDevices", "3f9c", "Other/hub/a1b2/status"), None);
        assert_eq!(parse_hub_topic("MyDevices", "3f9c", "MyDevices/a1b2/set/led"), None);
        assert_eq!(parse_hub_topic("MyDevices", "3f9c", "MyDevices/hub/a1b2"), None);
        assert_eq!(parse_hub_topic("MyDevices", "3f9c", "MyDevices/hub/a1b2/get/"), None);
    }

    #[test]
    fn test_subscription_covers_hub_tree() {
        assert_eq!(hub_subscription("MyDevices"), "MyDevices/hub/#");
        assert_eq!(discover_topic("MyDevices"), "MyDevices");
    }
}

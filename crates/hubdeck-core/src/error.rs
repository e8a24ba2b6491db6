//! Application error types with rich context

use thiserror::Error;

use crate::types::ConnectionKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration / Storage Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: ConnectionKind,
        message: String,
    },

    #[error("{kind} transport does not implement '{operation}' in this build")]
    Unsupported {
        kind: ConnectionKind,
        operation: &'static str,
    },

    #[error("MQTT broker is not connected")]
    BrokerUnavailable,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(kind: ConnectionKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported(kind: ConnectionKind, operation: &'static str) -> Self {
        Self::Unsupported { kind, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::transport(ConnectionKind::WebSocket, "refused");
        assert_eq!(err.to_string(), "Transport error (WS): refused");

        let err = Error::unsupported(ConnectionKind::Bluetooth, "connect");
        assert_eq!(
            err.to_string(),
            "BT transport does not implement 'connect' in this build"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_decode_error_mentions_subject() {
        let err = Error::decode("device registry", "unexpected end of input");
        assert!(err.to_string().contains("device registry"));
        assert!(err.to_string().contains("unexpected end of input"));
    }
}

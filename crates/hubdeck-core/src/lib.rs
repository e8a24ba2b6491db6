//! # hubdeck-core - Core Domain Types
//!
//! Foundation crate for hubdeck. Provides device and registry types, the
//! connection-kind tag, error handling, the PIN hash shared with hub firmware,
//! MQTT topic grammar and inbound message classification.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, serde_json, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`] - Persisted device record
//! - [`DeviceRegistry`] - Persisted id -> device map with merge semantics
//! - [`ConnectionKind`] - Transport currently believed to reach a device
//! - [`DeviceRuntime`] - Per-run state (connection kind, PIN grant, controls)
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum by layer: infrastructure, storage, decode, transport
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ### Wire helpers
//! - [`pin`] - Firmware-compatible string hash, PIN comparison, hub id generation
//! - [`topics`] - Topic and command string builders, inbound topic parsing
//! - [`discovery`] - Inbound message classification (`discover`, `ui`, `info`, ...)
//!
//! ## Prelude
//!
//! ```rust
//! use hubdeck_core::prelude::*;
//! ```

pub mod discovery;
pub mod error;
pub mod logging;
pub mod pin;
pub mod topics;
pub mod types;

/// Prelude for common imports used throughout all hubdeck crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use discovery::{parse_inbound, DiscoverReply, Inbound};
pub use error::{Error, Result};
pub use pin::{hub_id_from_millis, pin_matches, string_hash};
pub use topics::{DeviceCommand, HubTopic, InfoTopics};
pub use types::{ConnectionKind, Device, DeviceId, DeviceRegistry, DeviceRuntime, MergeOutcome};

//! Configuration for hubdeck
//!
//! - [`types`] - the user preference map and its compiled defaults
//! - [`store`] - persistence of preferences and the device registry
//! - [`transfer`] - export/import blob
//! - [`settings`] - `settings.toml` runtime tuning

pub mod settings;
pub mod store;
pub mod transfer;
pub mod types;

pub use settings::{load_settings, Settings};
pub use store::{ConfigStore, FileStorage, LoadedConfig, MemoryStorage, Storage};
pub use transfer::{export, import, Imported};
pub use types::{keys, Config, APP_VERSION};

//! Persistence for user preferences and the device registry
//!
//! Values are stored as JSON strings under two keys, `config` and `devices`,
//! in a [`Storage`] backend. [`FileStorage`] keeps one `<key>.json` file per
//! key; [`MemoryStorage`] backs tests and counts writes.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use serde_json::Value;

use hubdeck_core::prelude::*;
use hubdeck_core::DeviceRegistry;

use super::types::{keys, Config};

/// Storage key for the preference map
pub const CONFIG_KEY: &str = "config";

/// Storage key for the device registry
pub const DEVICES_KEY: &str = "devices";

/// Key-value string storage
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read a value; `Ok(None)` when the key was never written
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// File storage
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON file per key under a data directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| Error::storage(format!("Failed to read {}: {}", path.display(), e)))
    }

    /// Atomic write: temp file under an exclusive lock, then rename
    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::storage(format!("Failed to create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(key);
        let temp_path = self.dir.join(format!(".{key}.json.tmp"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::storage(format!("Failed to open {}: {}", temp_path.display(), e)))?;

        file.lock_exclusive()
            .map_err(|e| Error::storage(format!("Failed to lock {}: {}", temp_path.display(), e)))?;
        file.write_all(value.as_bytes())
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", temp_path.display(), e)))?;
        file.flush()
            .map_err(|e| Error::storage(format!("Failed to flush {}: {}", temp_path.display(), e)))?;
        drop(file);

        std::fs::rename(&temp_path, &path)
            .map_err(|e| Error::storage(format!("Failed to rename temp file: {}", e)))?;

        debug!("Saved {} to {:?}", key, path);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory storage
// ─────────────────────────────────────────────────────────────────────────────

/// Shared in-memory storage; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key without counting it as a write
    pub fn with_value(self, key: &str, value: impl Into<String>) -> Self {
        self.lock().values.insert(key.to_string(), value.into());
        self
    }

    /// Number of `write` calls made for `key`
    pub fn write_count(&self, key: &str) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.values.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_default() += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConfigStore
// ─────────────────────────────────────────────────────────────────────────────

/// Result of loading the preference map
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    /// The persisted version differed from this build's
    pub show_changelog: bool,
    /// The loaded value was back-filled or migrated and saved again
    pub saved: bool,
}

/// Load/save of preferences and registry over a [`Storage`] backend
#[derive(Debug)]
pub struct ConfigStore {
    storage: Box<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Load preferences on top of the compiled `defaults`.
    ///
    /// Keys present in `defaults` but missing from the persisted map are
    /// back-filled; a version mismatch overwrites `version` and raises the
    /// changelog flag. Either makes the map dirty, and a dirty map is saved
    /// exactly once before returning. Nothing persisted, or a value that is
    /// not a JSON object, yields the defaults unsaved.
    pub fn load(&self, defaults: Config) -> LoadedConfig {
        let persisted = match self.storage.read(CONFIG_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Some(Config::from_map(map)),
                Ok(_) => {
                    warn!("Persisted config is not an object, using defaults");
                    None
                }
                Err(e) => {
                    warn!("Failed to parse persisted config: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read persisted config: {}", e);
                None
            }
        };

        let Some(mut config) = persisted else {
            return LoadedConfig {
                config: defaults,
                show_changelog: false,
                saved: false,
            };
        };

        let mut dirty = false;
        for (key, value) in defaults.as_map() {
            if !config.contains(key) {
                config.set(key.clone(), value.clone());
                dirty = true;
            }
        }

        let mut show_changelog = false;
        if config.get(keys::VERSION) != defaults.get(keys::VERSION) {
            let version = defaults.get(keys::VERSION).cloned().unwrap_or(Value::Null);
            config.set(keys::VERSION, version);
            dirty = true;
            show_changelog = true;
        }

        if config.normalize_hub_id() {
            dirty = true;
        }

        let mut saved = false;
        if dirty {
            match self.save(&config) {
                Ok(()) => saved = true,
                Err(e) => warn!("Failed to save migrated config: {}", e),
            }
        }

        LoadedConfig {
            config,
            show_changelog,
            saved,
        }
    }

    /// Persist the full map verbatim, unknown keys included
    pub fn save(&self, config: &Config) -> Result<()> {
        let text = serde_json::to_string(config)?;
        self.storage.write(CONFIG_KEY, &text)
    }

    /// Load the registry; unreadable or malformed data yields an empty one
    pub fn load_devices(&self) -> DeviceRegistry {
        match self.storage.read(DEVICES_KEY) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Failed to parse persisted devices: {}", e);
                DeviceRegistry::new()
            }),
            Ok(None) => DeviceRegistry::new(),
            Err(e) => {
                warn!("Failed to read persisted devices: {}", e);
                DeviceRegistry::new()
            }
        }
    }

    pub fn save_devices(&self, devices: &DeviceRegistry) -> Result<()> {
        let text = serde_json::to_string(devices)?;
        self.storage.write(DEVICES_KEY, &text)
    }
}

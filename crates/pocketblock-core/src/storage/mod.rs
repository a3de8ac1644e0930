mod config;
pub mod database;

pub use config::{Config, OverridePolicy};
pub use database::Database;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConfigError, StorageError};

/// Storage keys. The names are the ones the app and its monitor extension
/// agree on; changing them orphans existing data.
pub mod keys {
    /// Shared: encoded set of opaque app tokens.
    pub const SELECTED_APPS: &str = "SelectedAppsTokens";
    /// Shared: encoded ordered list of schedules.
    pub const SAVED_SCHEDULES: &str = "SavedSchedules";
    /// Local: RFC 3339 deadline of the running temporary unblock.
    pub const REBLOCK_DATE: &str = "reblockDate";
    /// Local: onboarding flag.
    pub const ONBOARDING_COMPLETED: &str = "hasCompletedOnboarding";
    /// Simulated platform: apps currently shielded.
    pub const SHIELDED_APPS: &str = "ShieldedApplications";
    /// Simulated platform: installed interval monitors.
    pub const INSTALLED_MONITORS: &str = "InstalledMonitors";
}

/// A string key/value store.
///
/// One instance is shared between the app and its monitor extension (the
/// app-group store); another is private to the app. Processes do not share
/// memory, so a write becomes visible to the other process only on its next
/// read.
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and decode a JSON value. Missing, unreadable and undecodable values
/// all come back as `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "store read failed, treating as no data");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "stored value does not decode, treating as no data");
            None
        }
    }
}

/// Encode a value as JSON and write it.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, &json)
}

/// In-memory store for tests and embedding. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreState>>,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    values: HashMap<String, String>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with `StorageError::Unavailable`.
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.read_only {
            return Err(StorageError::Unavailable(format!("cannot write '{key}'")));
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.read_only {
            return Err(StorageError::Unavailable(format!("cannot remove '{key}'")));
        }
        state.values.remove(key);
        Ok(())
    }
}

/// Returns the data directory.
///
/// `POCKETBLOCK_DATA_DIR` wins when set. Otherwise `~/.config/pocketblock[-dev]/`,
/// with `POCKETBLOCK_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("POCKETBLOCK_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("POCKETBLOCK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pocketblock-dev")
            } else {
                base_dir.join("pocketblock")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_value_is_no_data() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        assert_eq!(load_json::<Vec<u32>>(&store, "k"), None);
        assert_eq!(load_json::<Vec<u32>>(&store, "missing"), None);
    }

    #[test]
    fn json_roundtrip_through_store() {
        let store = MemoryStore::new();
        save_json(&store, "k", &vec![1u32, 2, 3]).unwrap();
        assert_eq!(load_json::<Vec<u32>>(&store, "k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let store = MemoryStore::new();
        store.set("k", "1").unwrap();
        store.set_read_only(true);
        assert!(matches!(store.set("k", "2"), Err(StorageError::Unavailable(_))));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1"));
    }
}

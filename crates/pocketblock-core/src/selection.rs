//! The global set of apps to shield.
//!
//! Chosen once through the platform picker and shared by every schedule.
//! Per-schedule app sets are not supported.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{keys, load_json, save_json, SharedStore};

/// Opaque application token handed out by the platform picker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppToken(String);

impl AppToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppSelection {
    tokens: BTreeSet<AppToken>,
}

impl AppSelection {
    pub fn new(tokens: impl IntoIterator<Item = AppToken>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Load from the shared store; missing or corrupt data is an empty set.
    pub fn load(store: &dyn SharedStore) -> Self {
        load_json(store, keys::SELECTED_APPS).unwrap_or_default()
    }

    pub fn save(&self, store: &dyn SharedStore) -> Result<(), StorageError> {
        save_json(store, keys::SELECTED_APPS, self)
    }

    pub fn tokens(&self) -> &BTreeSet<AppToken> {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

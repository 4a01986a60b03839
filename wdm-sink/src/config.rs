//! Client and store configuration, optionally loaded from a TOML file.
//!
//! ```toml
//! name = "living-room-hub"
//!
//! [store]
//! invalid_handle = "lenient"
//! ```

use crate::error::{SinkError, SinkResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// What a store does when called without a usable backend handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidHandlePolicy {
    /// Return [`SinkError::NoBackend`] / [`SinkError::InvalidHandle`].
    #[default]
    Strict,
    /// Log the failure and return the type's default value.
    Lenient,
}

/// Per-store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub invalid_handle: InvalidHandlePolicy,
}

impl StoreConfig {
    /// Settings that reproduce the log-and-default behaviour.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            invalid_handle: InvalidHandlePolicy::Lenient,
        }
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name used in log output.
    pub name: String,
    /// Settings applied to every store the client creates.
    pub store: StoreConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "wdm-client".to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> SinkResult<Self> {
        toml::from_str(contents).map_err(|e| SinkError::Config(e.to_string()))
    }

    /// Loads configuration from `path`.
    /// Falls back to defaults with a warning if the file is missing or invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No client config at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded client config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse client config {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read client config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

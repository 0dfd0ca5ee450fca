//! # Node Configuration
//!
//! One JSON document with a section per component. Every field has a
//! default, so a partial file (or none at all) is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use update_publisher::PublisherConfig;
use update_store::StoreConfig;
use update_sync::SyncConfig;
use update_transport::TransportConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },
    /// File is not a valid configuration document.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Cause.
        source: serde_json::Error,
    },
}

/// Complete node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding the store document and the publisher key.
    pub data_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Version store.
    pub store: StoreConfig,
    /// Transport.
    pub transport: TransportConfig,
    /// Sync orchestrator.
    pub sync: SyncConfig,
    /// Publisher.
    pub publisher: PublisherConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("update-data"),
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            transport: TransportConfig::default(),
            sync: SyncConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Configuration from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

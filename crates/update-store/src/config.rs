//! Store configuration.

use serde::{Deserialize, Serialize};
use update_protocol::{ChainHead, GENESIS_HASH};

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Genesis manifest hash per deployment.
    pub genesis_manifest_hash: String,
    /// Genesis VRF output per deployment.
    pub genesis_vrf_output_hex: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            genesis_manifest_hash: GENESIS_HASH.to_string(),
            genesis_vrf_output_hex: GENESIS_HASH.to_string(),
        }
    }
}

impl StoreConfig {
    /// Defaults.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Genesis head.
    pub fn genesis_head(&self) -> ChainHead {
        ChainHead::genesis(&self.genesis_manifest_hash, &self.genesis_vrf_output_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.genesis_head().is_genesis());
        assert_eq!(config.genesis_head().last_manifest_hash, GENESIS_HASH);
    }

    #[test]
    fn test_invalid_genesis_falls_back() {
        let config = StoreConfig {
            genesis_manifest_hash: "nope".into(),
            ..StoreConfig::for_testing()
        };
        assert_eq!(config.genesis_head().last_manifest_hash, GENESIS_HASH);
    }
}

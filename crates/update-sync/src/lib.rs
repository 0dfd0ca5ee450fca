//! # Update Sync
//!
//! Orchestrates one update scope: carrier quorum, chain promotion, rollout
//! gating, then download, staging and apply through the platform plugin.
//!
//! ## Module Structure
//!
//! ```text
//! update-sync/
//! ├── domain/
//! │   ├── entities.rs   - Install results, chunk requests, metric names
//! │   └── errors.rs
//! ├── ports/
//! │   ├── inbound.rs    - UpdateSyncApi
//! │   └── outbound.rs   - UpdateApplier (+ mock)
//! ├── algorithms/
//! │   ├── quorum.rs     - Carrier quorum
//! │   └── artifact.rs   - Gateway URLs, artifact hashes, control keys
//! ├── application/
//! │   ├── service.rs    - UpdateSyncService, promotion loop
//! │   ├── controls.rs   - Buffered revocations and kill-switches
//! │   └── pipeline.rs   - Download / stage / apply
//! └── config.rs
//! ```
//!
//! ## Lifecycle
//!
//! `DETECTED → VERIFIED → ATTESTED → DOWNLOADED → STAGED → APPLYING → APPLIED`,
//! with `FAILED` and `REVOKED` reachable from anywhere.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use algorithms::{control_key, to_gateway_url, verify_artifact_hash, CarrierQuorum};
pub use application::UpdateSyncService;
pub use config::SyncConfig;
pub use domain::{
    metrics, ApplierError, ApplierResult, ApplyOutcome, ChunkRequest, DownloadSource, DownloadedArtifact,
    InstallResult, InstallStatus, InstalledVersion, SyncError,
};
pub use ports::{MockApplierState, MockUpdateApplier, UpdateApplier, UpdateSyncApi};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

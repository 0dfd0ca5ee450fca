//! # Update Store
//!
//! Single-owner, persisted record of the update lifecycle.
//!
//! ## Module Structure
//!
//! ```text
//! update-store/
//! ├── domain/
//! │   ├── entities.rs  - Snapshot, scoped versions, candidates, kill-switches
//! │   ├── state.rs     - Pure state transitions
//! │   ├── hydrate.rs   - Defensive load of persisted documents
//! │   └── errors.rs
//! ├── ports/
//! │   └── outbound.rs  - StateStoragePort
//! ├── adapters/
//! │   └── json_file.rs - fs2-locked JSON document
//! ├── application/
//! │   └── service.rs   - VersionStore (lock, persist, broadcast)
//! └── config.rs
//! ```
//!
//! Every mutation is applied, persisted and broadcast before the next one
//! starts. Persistence failures are logged and never surface to callers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::JsonFileStateStorage;
pub use application::VersionStore;
pub use config::StoreConfig;
pub use domain::{
    hydrate_state, installed_manifest_id, CandidateStatus, KillSwitchEntry, LatestSource, LifecycleState,
    PendingCandidate, ScopedVersionState, StoreError, StoreResult, UpdateSnapshot, UpdateStoreState,
    VerifiedLatestState,
};
pub use ports::{InMemoryStateStorage, StateStoragePort};

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

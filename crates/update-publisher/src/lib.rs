//! # Update Publisher
//!
//! Admin side of the update protocol. Seals manifests, revocations and
//! kill-switches onto the per-scope VRF chain and disseminates them.
//!
//! ## Module Structure
//!
//! ```text
//! update-publisher/
//! ├── domain/
//! │   ├── entities.rs   - PublishResult, StoredKey, PreparedMessage
//! │   └── errors.rs     - PublishError
//! ├── ports/
//! │   ├── inbound.rs    - UpdatePublisherApi
//! │   └── outbound.rs   - KeyStorePort (+ in-memory)
//! ├── algorithms/
//! │   ├── failure.rs    - Carrier failure reasons
//! │   └── notes.rs      - Release-notes gate
//! ├── adapters/
//! │   └── json_file.rs  - File-backed key store
//! ├── application/
//! │   └── service.rs    - UpdatePublisher
//! └── config.rs
//! ```
//!
//! ## Carriers
//!
//! Every entry goes out twice, as a gossip message and as a content feed
//! item, each in its own envelope. Only gossip is required.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::JsonFileKeyStore;
pub use algorithms::{classify_gossip_failure, require_release_notes};
pub use application::UpdatePublisher;
pub use config::{PublisherConfig, RetryPolicy};
pub use domain::{
    CarrierOutcome, PreparedMessage, PublishError, PublishOptions, PublishResult, PublisherResult, StoredKey,
};
pub use ports::{InMemoryKeyStore, KeyStorePort, UpdatePublisherApi};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

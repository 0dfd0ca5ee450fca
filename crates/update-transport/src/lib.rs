//! # Update Transport
//!
//! Receives update messages over two independent carriers and hands them
//! to the sync engine as one typed stream.
//!
//! ## Module Structure
//!
//! ```text
//! update-transport/
//! ├── domain/
//! │   ├── entities.rs   - TransportMessage, topics, poll results
//! │   ├── normalize.rs  - Payload unwrapping and topic inference
//! │   └── errors.rs
//! ├── ports/
//! │   ├── inbound.rs    - UpdateTransportApi
//! │   └── outbound.rs   - P2pNetwork (+ mock)
//! ├── application/
//! │   └── service.rs    - UpdateTransport
//! └── config.rs
//! ```
//!
//! ## Carriers
//!
//! - **gossip**: pubsub on `{prefix}/{channel}/{platform}/{kind}`
//! - **feed**: the local feed snapshot plus feeds of peers found through
//!   rendezvous or live discovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::UpdateTransport;
pub use config::TransportConfig;
pub use domain::normalize;
pub use domain::{
    ConnectivityReason, DiscoveredPeer, ManualCheckResult, MessageSource, NetworkEvent, PollResult, RuntimeHealth,
    TransportError, TransportMessage, TransportResult, UpdateTopics, NETWORK_EVENT, PUBSUB_MESSAGE_EVENT,
};
pub use ports::{MockNetworkState, MockP2pNetwork, P2pNetwork, UpdateTransportApi};

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

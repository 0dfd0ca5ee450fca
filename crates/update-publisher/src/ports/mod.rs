//! Ports layer.

pub mod inbound;
pub mod outbound;

pub use inbound::UpdatePublisherApi;
pub use outbound::{InMemoryKeyStore, KeyStorePort};

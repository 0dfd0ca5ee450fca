//! Ports layer.

pub mod inbound;
pub mod outbound;

pub use inbound::UpdateTransportApi;
pub use outbound::{MockNetworkState, MockP2pNetwork, P2pNetwork};

//! Ports layer.

pub mod inbound;
pub mod outbound;

pub use inbound::UpdateSyncApi;
pub use outbound::{MockApplierState, MockUpdateApplier, UpdateApplier};

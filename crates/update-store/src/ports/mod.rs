//! Store ports.

pub mod outbound;

pub use outbound::{InMemoryStateStorage, StateStoragePort};

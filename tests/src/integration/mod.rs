//! Publisher-to-device choreography.

pub mod flows;
pub mod harness;

pub use harness::UpdateNetwork;

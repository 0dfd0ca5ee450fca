//! Application layer.

mod controls;
mod pipeline;
pub mod service;

pub use service::UpdateSyncService;

//! # Domain Module
//!
//! Persisted entities, the pure state machine over them, and rehydration.

pub mod entities;
pub mod errors;
pub mod hydrate;
pub mod state;

pub use entities::*;
pub use errors::*;
pub use hydrate::hydrate_state;

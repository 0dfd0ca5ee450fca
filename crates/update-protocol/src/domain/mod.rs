//! # Domain Module
//!
//! Wire types of the update protocol and their lenient parsers.

pub mod chain;
pub mod control;
pub mod envelope;
pub mod errors;
pub mod fields;
pub mod manifest;
pub mod payload;
pub mod topics;
pub mod value_objects;

pub use chain::*;
pub use control::*;
pub use envelope::*;
pub use errors::*;
pub use manifest::*;
pub use payload::*;
pub use topics::*;
pub use value_objects::*;

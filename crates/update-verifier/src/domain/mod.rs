//! # Domain Module
//!
//! Verification reasons and the small entities checks work on.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;

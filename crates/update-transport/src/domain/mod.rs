//! Domain layer.

pub mod entities;
pub mod errors;
pub mod normalize;

pub use entities::*;
pub use errors::*;

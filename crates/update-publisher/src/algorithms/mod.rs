//! # Algorithms
//!
//! - `failure`: carrier failure reasons
//! - `notes`: release-notes gate

pub mod failure;
pub mod notes;

pub use failure::{classify_gossip_failure, failure_suffix, is_not_ready_text};
pub use notes::{has_release_notes, require_release_notes};

//! # Update Node
//!
//! Operator binary around the update engine.
//!
//! ## Module Structure
//!
//! ```text
//! update-node/
//! ├── cli.rs       - clap command line
//! ├── commands.rs  - keygen, sign-*, verify, inspect-state
//! ├── config.rs    - NodeConfig (JSON, every field defaulted)
//! ├── offline.rs   - P2pNetwork stand-in for offline signing
//! └── main.rs      - Logging setup and dispatch
//! ```
//!
//! Signing commands consume chain positions in the local store, so entries
//! signed from one data directory always link to each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod offline;

pub use cli::{Cli, Command, TargetArgs};
pub use commands::NodeContext;
pub use config::{ConfigError, NodeConfig};
pub use offline::OfflineNetwork;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

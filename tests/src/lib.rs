//! # Update Test Suite
//!
//! End-to-end scenarios across the update crates: an admin publisher on one
//! side, a subscribing device on the other, both carriers in between.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs    # Publisher + relay + subscriber wiring
//!     └── flows.rs      # Release, revoke, kill-switch, replay, gap scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p update-tests
//! cargo test -p update-tests integration::flows::
//! ```

pub mod integration;

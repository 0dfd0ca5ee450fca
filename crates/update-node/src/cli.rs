//! Command line.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::NodeConfig;

/// Operator tools for peer-to-peer software updates.
#[derive(Parser, Debug)]
#[command(name = "update-node")]
#[command(about = "Sign, verify and inspect peer-to-peer software updates")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the configuration)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Publisher peer id written into proofs
    #[arg(long, global = true)]
    pub peer_id: Option<String>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Fold command line overrides into `config`.
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(peer_id) = &self.peer_id {
            config.publisher.fallback_peer_id = peer_id.clone();
        }
    }
}

/// Scope and lifetime of a signed entry.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Release channel (defaults to the message's own, then `stable`)
    #[arg(long)]
    pub channel: Option<String>,

    /// Platform (defaults to the message's own, then `android`)
    #[arg(long)]
    pub platform: Option<String>,

    /// Envelope lifetime in milliseconds
    #[arg(long)]
    pub expires_in_ms: Option<u64>,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the publisher key, creating one on first use
    Keygen {
        /// Import this Ed25519 secret (hex seed) instead
        #[arg(long, conflicts_with = "rotate")]
        import_secret: Option<String>,

        /// Replace the stored key with a fresh one
        #[arg(long)]
        rotate: bool,
    },

    /// Seal a manifest JSON file onto the local chain
    SignManifest {
        /// Manifest JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Scope and envelope lifetime
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Seal a revocation onto the local chain
    SignRevoke {
        /// Revoked manifest id
        #[arg(long)]
        manifest_id: Option<String>,

        /// Revoke every manifest at or below this sequence
        #[arg(long)]
        max_sequence: Option<u64>,

        /// Further revoked manifest ids
        #[arg(long = "target")]
        targets: Vec<String>,

        /// Reason shown to users
        #[arg(long, default_value = "revoked")]
        reason: String,

        /// Scope and envelope lifetime
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Seal a kill-switch onto the local chain
    SignKillswitch {
        /// Reason shown to users
        #[arg(long, default_value = "killswitch")]
        reason: String,

        /// Lift the switch instead of raising it
        #[arg(long)]
        disable: bool,

        /// Switch expiry (unix ms)
        #[arg(long)]
        expires_at_ms: Option<u64>,

        /// Scope and envelope lifetime
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check an envelope JSON file
    Verify {
        /// Envelope JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Fail envelopes without a valid signature
        #[arg(long)]
        require_signature: bool,
    },

    /// Print the persisted store
    InspectState {
        /// Whole document instead of the snapshot
        #[arg(long)]
        full: bool,
    },
}

//! # Inbound Port
//!
//! Checks the sync engine runs on every received message.

use serde_json::{Map, Value};
use update_protocol::{ChainHead, Envelope, Manifest};

use crate::domain::{ChainAdvance, VerifyError, VersionBaseline};

/// Update verification API.
pub trait UpdateVerificationApi: Send + Sync {
    /// Record a nonce. `false` means it was already seen.
    fn register_envelope_nonce(&self, nonce: &str, expires_at_ms: u64, now_ms: u64) -> bool;

    /// Expiry, payload hash, signature and replay checks, in that order.
    /// The signature is only checked when `require_signature` is set.
    fn verify_envelope_security(
        &self,
        envelope: &Envelope,
        now_ms: u64,
        require_signature: bool,
    ) -> Result<(), VerifyError>;

    /// Trust mode and rollback checks against the applied baseline.
    fn verify_manifest_security(&self, manifest: &Manifest, baseline: &VersionBaseline) -> Result<(), VerifyError>;

    /// Chain linkage and proof checks for a manifest.
    fn verify_vrf_chain_candidate(&self, manifest: &Manifest, head: &ChainHead) -> Result<ChainAdvance, VerifyError>;

    /// Chain linkage and proof checks for a revoke / kill-switch payload.
    fn verify_control_vrf(
        &self,
        payload: &Map<String, Value>,
        channel: &str,
        platform: &str,
        head: &ChainHead,
    ) -> Result<ChainAdvance, VerifyError>;

    /// Stable device id used for rollout bucketing.
    fn device_id(&self) -> String;
}

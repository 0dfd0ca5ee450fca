//! # Verification Errors
//!
//! Each variant renders as the reason code used in logs and metrics.

use thiserror::Error;

/// Reason a message failed verification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyError {
    /// Envelope expiry has passed.
    #[error("expired")]
    Expired,
    /// Envelope carries no payload hash.
    #[error("payload_hash_missing")]
    PayloadHashMissing,
    /// Payload hash does not match the payload.
    #[error("payload_hash_mismatch")]
    PayloadHashMismatch,
    /// Required envelope signature is missing or invalid.
    #[error("envelope_signature_invalid")]
    EnvelopeSignatureInvalid,
    /// Nonce already seen.
    #[error("replayed_nonce")]
    ReplayedNonce,
    /// Non-chain manifest while legacy acceptance is off.
    #[error("legacy_mode_rejected")]
    LegacyModeRejected,
    /// Legacy manifest lacks enough valid signatures.
    #[error("threshold_not_met")]
    ThresholdNotMet,
    /// Version vector does not exceed the applied baseline.
    #[error("rollback_rejected")]
    RollbackRejected,
    /// Manifest is not `vrf_chain_v1`.
    #[error("mode_not_vrf_chain")]
    ModeNotVrfChain,
    /// Manifest has no VRF block.
    #[error("vrf_payload_missing")]
    VrfPayloadMissing,
    /// Unknown VRF scheme.
    #[error("vrf_scheme_unsupported")]
    VrfSchemeUnsupported,
    /// Manifest sequence does not follow the chain head.
    #[error("sequence_gap_or_reorder")]
    SequenceGapOrReorder,
    /// `prev_manifest_hash` differs from the head.
    #[error("prev_manifest_hash_mismatch")]
    PrevManifestHashMismatch,
    /// `prev_vrf_output_hex` differs from the head.
    #[error("prev_vrf_output_mismatch")]
    PrevVrfOutputMismatch,
    /// Recomputed input differs.
    #[error("vrf_input_mismatch")]
    VrfInputMismatch,
    /// Proof does not verify.
    #[error("vrf_proof_invalid")]
    VrfProofInvalid,
    /// Output does not derive from the proof.
    #[error("vrf_output_mismatch")]
    VrfOutputMismatch,
    /// Control message has no VRF block.
    #[error("vrf_missing")]
    VrfMissing,
    /// Control message has no positive sequence.
    #[error("sequence_missing")]
    SequenceMissing,
    /// Control sequence does not follow the chain head.
    #[error("sequence_not_contiguous")]
    SequenceNotContiguous,
    /// Sequence is not a whole number the chain can hold.
    #[error("sequence_out_of_range")]
    SequenceOutOfRange,
    /// Hashing the message failed.
    #[error("encoding_failed")]
    EncodingFailed,
}

impl VerifyError {
    /// Reason code.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Persistence errors of verifier state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding failure.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(VerifyError::ReplayedNonce.reason(), "replayed_nonce");
        assert_eq!(VerifyError::RollbackRejected.to_string(), "rollback_rejected");
        assert_eq!(
            VerifyError::PrevVrfOutputMismatch.to_string(),
            "prev_vrf_output_mismatch"
        );
    }
}

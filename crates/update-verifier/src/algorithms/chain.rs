//! # Chain Verification
//!
//! A candidate extends the head only if its sequence is exactly head + 1
//! (any positive sequence at genesis), its `prev_*` fields equal the head,
//! its input recomputes, its proof verifies and its output derives from the
//! proof. Checks run in that order and the first failure is reported.

use serde_json::{Map, Value};
use update_protocol::{
    build_vrf_input, canonical_control_core, canonical_manifest_core, derive_vrf_output,
    hash_control_payload, hash_manifest_for_chain, parse_vrf_proof, verify_vrf, ChainHead,
    ChainPosition, ConflictCandidate, Manifest, ProtocolError, SecurityMode, VrfProof, MAX_SEQUENCE,
    VRF_SCHEME,
};

use crate::domain::{ChainAdvance, VerifyError};

/// Whether `candidate_sequence` may follow `head`.
pub fn can_advance(head: &ChainHead, candidate_sequence: u64) -> bool {
    if head.is_genesis() {
        (1..=MAX_SEQUENCE).contains(&candidate_sequence)
    } else {
        head.next_sequence() == Some(candidate_sequence)
    }
}

/// Among candidates sharing the first candidate's sequence, the one with the
/// smallest output wins.
pub fn resolve_sequence_conflict<T: ConflictCandidate>(candidates: &[T]) -> Option<&T> {
    let first = candidates.first()?;
    let sequence = first.sequence();
    candidates
        .iter()
        .filter(|c| c.sequence() == sequence)
        .min_by(|a, b| a.vrf_output_hex().cmp(b.vrf_output_hex()))
}

fn check_proof(vrf: &VrfProof, expected_input: &str) -> Result<String, VerifyError> {
    if !expected_input.eq_ignore_ascii_case(&vrf.vrf_input_hex) {
        return Err(VerifyError::VrfInputMismatch);
    }
    check_vrf_proof(vrf)
}

/// Proof verifies under its own key and the output derives from it. Says
/// nothing about where the entry sits in the chain.
pub fn check_vrf_proof(vrf: &VrfProof) -> Result<String, VerifyError> {
    if !verify_vrf(&vrf.vrf_input_hex, &vrf.vrf_proof_base64, &vrf.vrf_public_key_hex) {
        return Err(VerifyError::VrfProofInvalid);
    }
    let derived = derive_vrf_output(&vrf.vrf_proof_base64).map_err(|_| VerifyError::VrfProofInvalid)?;
    if !derived.eq_ignore_ascii_case(&vrf.vrf_output_hex) {
        return Err(VerifyError::VrfOutputMismatch);
    }
    Ok(derived.to_lowercase())
}

/// Verify a manifest against a normalized chain head.
pub fn verify_vrf_chain_candidate(
    manifest: &Manifest,
    head: &ChainHead,
    strict_contiguous: bool,
) -> Result<ChainAdvance, VerifyError> {
    if manifest.security.mode != SecurityMode::VrfChainV1 {
        return Err(VerifyError::ModeNotVrfChain);
    }
    let vrf = manifest.security.vrf.as_ref().ok_or(VerifyError::VrfPayloadMissing)?;
    if vrf.scheme != VRF_SCHEME {
        return Err(VerifyError::VrfSchemeUnsupported);
    }
    if manifest.sequence > MAX_SEQUENCE {
        return Err(VerifyError::SequenceOutOfRange);
    }
    if strict_contiguous && !can_advance(head, manifest.sequence) {
        return Err(VerifyError::SequenceGapOrReorder);
    }
    if vrf.prev_manifest_hash.to_lowercase() != head.last_manifest_hash {
        return Err(VerifyError::PrevManifestHashMismatch);
    }
    if vrf.prev_vrf_output_hex.to_lowercase() != head.last_vrf_output_hex {
        return Err(VerifyError::PrevVrfOutputMismatch);
    }

    let core = canonical_manifest_core(manifest).map_err(|_| VerifyError::EncodingFailed)?;
    let expected_input = build_vrf_input(
        &core,
        &ChainPosition {
            channel: manifest.channel.clone(),
            platform: manifest.platform.clone(),
            sequence: manifest.sequence,
            prev_manifest_hash: vrf.prev_manifest_hash.clone(),
            prev_vrf_output_hex: vrf.prev_vrf_output_hex.clone(),
        },
    );
    let output = check_proof(vrf, &expected_input)?;

    Ok(ChainAdvance {
        sequence: manifest.sequence,
        manifest_hash: hash_manifest_for_chain(manifest).map_err(|_| VerifyError::EncodingFailed)?,
        vrf_output_hex: output,
    })
}

/// Verify a raw revoke / kill-switch payload against a normalized chain head.
///
/// The payload's own `channel`/`platform` are overridden by the scope the
/// message was routed to.
pub fn verify_control_vrf(
    payload: &Map<String, Value>,
    channel: &str,
    platform: &str,
    head: &ChainHead,
) -> Result<ChainAdvance, VerifyError> {
    let vrf = payload
        .get("vrf")
        .ok_or(VerifyError::VrfMissing)
        .and_then(|v| {
            parse_vrf_proof(v).map_err(|e| match e {
                ProtocolError::UnsupportedScheme(_) => VerifyError::VrfSchemeUnsupported,
                _ => VerifyError::VrfMissing,
            })
        })?;
    let sequence = update_protocol::fields::sequence(payload, &["sequence"])
        .map_err(|_| VerifyError::SequenceOutOfRange)?
        .unwrap_or(0);
    if sequence == 0 {
        return Err(VerifyError::SequenceMissing);
    }
    if !can_advance(head, sequence) {
        return Err(VerifyError::SequenceNotContiguous);
    }
    if vrf.prev_manifest_hash != head.last_manifest_hash {
        return Err(VerifyError::PrevManifestHashMismatch);
    }
    if vrf.prev_vrf_output_hex != head.last_vrf_output_hex {
        return Err(VerifyError::PrevVrfOutputMismatch);
    }

    let core = canonical_control_core(payload, channel, platform, sequence, &vrf.identity());
    let expected_input = build_vrf_input(
        &core,
        &ChainPosition {
            channel: channel.to_string(),
            platform: platform.to_string(),
            sequence,
            prev_manifest_hash: vrf.prev_manifest_hash.clone(),
            prev_vrf_output_hex: vrf.prev_vrf_output_hex.clone(),
        },
    );
    let output = check_proof(&vrf, &expected_input)?;

    Ok(ChainAdvance {
        sequence,
        manifest_hash: hash_control_payload(payload),
        vrf_output_hex: output,
    })
}

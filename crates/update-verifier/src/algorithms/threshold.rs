//! # Legacy Trust Threshold
//!
//! Only cryptographically valid signatures count. A committee manifest with
//! committee keys only counts signers listed there; a single-publisher
//! manifest needs a valid signature from its publisher key.

use update_protocol::{verify_manifest_signatures, Manifest, SecurityMode, DEFAULT_COMMITTEE_THRESHOLD};

use crate::domain::ThresholdResult;

/// Count valid signatures against the manifest's trust mode.
pub fn verify_manifest_threshold(manifest: &Manifest) -> ThresholdResult {
    let security = &manifest.security;
    let valid = match verify_manifest_signatures(manifest) {
        Ok(check) => check.valid_signers,
        Err(_) => Vec::new(),
    };

    match security.mode {
        SecurityMode::VrfChainV1 => ThresholdResult {
            ok: true,
            required: 0,
            matched_signers: Vec::new(),
        },
        SecurityMode::SinglePublisherChain => {
            let publisher = security
                .publisher_pubkey
                .as_deref()
                .map(|k| k.trim().to_lowercase())
                .unwrap_or_default();
            let matched: Vec<String> = valid
                .into_iter()
                .filter(|s| !publisher.is_empty() && s.to_lowercase() == publisher)
                .collect();
            ThresholdResult {
                ok: !matched.is_empty(),
                required: 1,
                matched_signers: matched,
            }
        }
        SecurityMode::CommitteeThreshold => {
            let committee: Vec<String> = security
                .committee_keys
                .iter()
                .map(|k| k.trim().to_lowercase())
                .collect();
            let matched: Vec<String> = valid
                .into_iter()
                .filter(|s| committee.is_empty() || committee.contains(&s.to_lowercase()))
                .collect();
            let required = if security.threshold == 0 {
                DEFAULT_COMMITTEE_THRESHOLD
            } else {
                security.threshold
            };
            ThresholdResult {
                ok: matched.len() as u32 >= required,
                required,
                matched_signers: matched,
            }
        }
    }
}

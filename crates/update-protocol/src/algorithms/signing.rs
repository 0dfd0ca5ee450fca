//! Committee and single-publisher manifest signatures.
//!
//! Signers sign the canonical manifest with runtime proof fields and the
//! signature list itself left out.

use serde_json::json;
use update_crypto::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

use crate::algorithms::canonical::canonicalize;
use crate::domain::errors::ProtocolResult;
use crate::domain::manifest::{Manifest, ManifestSignature};

/// Canonical text covered by manifest signatures.
pub fn manifest_signing_text(manifest: &Manifest) -> ProtocolResult<String> {
    let security = &manifest.security;
    let payload = json!({
        "kind": manifest.kind,
        "schema_version": manifest.schema_version,
        "manifest_id": manifest.manifest_id,
        "channel": manifest.channel,
        "platform": manifest.platform,
        "sequence": manifest.sequence,
        "version": manifest.version,
        "version_code": manifest.version_code,
        "artifacts": serde_json::to_value(&manifest.artifacts)?,
        "rollout": serde_json::to_value(&manifest.rollout)?,
        "policy": serde_json::to_value(&manifest.policy)?,
        "security": {
            "mode": security.mode,
            "threshold": security.threshold,
            "committee_keys": security.committee_keys,
            "publisher_pubkey": security.publisher_pubkey,
            "next_publisher_pubkey_sha256": security.next_publisher_pubkey_sha256,
            "attestation_threshold": security.attestation_threshold,
            "vrf": security.vrf.as_ref().map(|v| serde_json::to_value(v.identity())).transpose()?,
        },
        "anchor": serde_json::to_value(&manifest.anchor)?,
        "metadata": manifest.metadata,
    });
    Ok(canonicalize(&payload))
}

/// Append a signature by `keypair`.
pub fn sign_manifest(manifest: &mut Manifest, keypair: &Ed25519KeyPair) -> ProtocolResult<()> {
    let text = manifest_signing_text(manifest)?;
    manifest.security.signatures.push(ManifestSignature {
        signer: keypair.public_key().to_hex(),
        signature: keypair.sign(text.as_bytes()).to_base64(),
    });
    Ok(())
}

/// Signers whose signatures verify, and those whose do not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureCheck {
    /// Distinct valid signers.
    pub valid_signers: Vec<String>,
    /// Distinct invalid signers.
    pub invalid_signers: Vec<String>,
}

/// Verify every manifest signature.
pub fn verify_manifest_signatures(manifest: &Manifest) -> ProtocolResult<SignatureCheck> {
    let text = manifest_signing_text(manifest)?;
    let mut check = SignatureCheck::default();
    for entry in &manifest.security.signatures {
        let signer = entry.signer.trim();
        let signature = entry.signature.trim();
        if signer.is_empty() || signature.is_empty() {
            continue;
        }
        let ok = match (Ed25519PublicKey::from_hex(signer), Ed25519Signature::from_base64(signature)) {
            (Ok(key), Ok(sig)) => key.verify(text.as_bytes(), &sig).is_ok(),
            _ => false,
        };
        let bucket = if ok {
            &mut check.valid_signers
        } else {
            &mut check.invalid_signers
        };
        if !bucket.iter().any(|s| s == signer) {
            bucket.push(signer.to_string());
        }
    }
    Ok(check)
}

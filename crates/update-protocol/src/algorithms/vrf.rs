//! # VRF Chain Engine
//!
//! Each manifest (and control message) in a scope commits to its chain
//! position: the input hashes the scope, the sequence, the previous manifest
//! hash, the previous output and the hash of the canonical core. The proof is
//! an Ed25519 signature over the input bytes and the output is the SHA-256 of
//! the proof.
//!
//! This is a deterministic sign-then-hash construction. It links history so
//! reordering or forking changes the input, but it is not a VRF with
//! uniqueness guarantees beyond those of a plain signature.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use update_crypto::{
    decode_base64, decode_hex, sha256_hex, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature,
};

use crate::algorithms::canonical::{canonical_hash, canonicalize};
use crate::domain::errors::ProtocolResult;
use crate::domain::manifest::{Manifest, SecurityMode, VrfProof, VRF_SCHEME};
use crate::domain::value_objects::GENESIS_HASH;

/// Domain tag mixed into every input.
pub const VRF_DOMAIN: [&str; 3] = ["unimaker", "vrf", "v1"];

/// Chain position an input is built for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainPosition {
    /// Channel.
    pub channel: String,
    /// Platform.
    pub platform: String,
    /// Sequence of the new entry.
    pub sequence: u64,
    /// Hash of the previous entry.
    pub prev_manifest_hash: String,
    /// Output of the previous entry.
    pub prev_vrf_output_hex: String,
}

/// Identity fields of a proof block. These are part of the signed core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfIdentity {
    /// Scheme.
    pub scheme: String,
    /// Publishing peer.
    pub publisher_peer_id: String,
    /// Public key, lowercase hex.
    pub vrf_public_key_hex: String,
    /// Previous manifest hash.
    pub prev_manifest_hash: String,
    /// Previous output.
    pub prev_vrf_output_hex: String,
}

impl VrfIdentity {
    /// Identity for a publisher extending `prev`.
    pub fn new(publisher_peer_id: &str, public_key_hex: &str, prev_hash: &str, prev_output: &str) -> Self {
        Self {
            scheme: VRF_SCHEME.to_string(),
            publisher_peer_id: publisher_peer_id.to_string(),
            vrf_public_key_hex: public_key_hex.to_lowercase(),
            prev_manifest_hash: prev_hash.to_lowercase(),
            prev_vrf_output_hex: prev_output.to_lowercase(),
        }
    }

    /// Proof block with placeholder runtime fields.
    pub fn placeholder_proof(&self) -> VrfProof {
        VrfProof {
            scheme: self.scheme.clone(),
            publisher_peer_id: self.publisher_peer_id.clone(),
            vrf_public_key_hex: self.vrf_public_key_hex.clone(),
            prev_manifest_hash: self.prev_manifest_hash.clone(),
            prev_vrf_output_hex: self.prev_vrf_output_hex.clone(),
            vrf_input_hex: GENESIS_HASH.to_string(),
            vrf_proof_base64: String::new(),
            vrf_output_hex: GENESIS_HASH.to_string(),
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "scheme": self.scheme,
            "publisher_peer_id": self.publisher_peer_id,
            "vrf_public_key_hex": self.vrf_public_key_hex,
            "prev_manifest_hash": self.prev_manifest_hash,
            "prev_vrf_output_hex": self.prev_vrf_output_hex,
        })
    }
}

impl VrfProof {
    /// Identity part of the proof.
    pub fn identity(&self) -> VrfIdentity {
        VrfIdentity {
            scheme: self.scheme.clone(),
            publisher_peer_id: self.publisher_peer_id.clone(),
            vrf_public_key_hex: self.vrf_public_key_hex.clone(),
            prev_manifest_hash: self.prev_manifest_hash.clone(),
            prev_vrf_output_hex: self.prev_vrf_output_hex.clone(),
        }
    }
}

/// Canonical manifest core: everything except the runtime proof fields.
pub fn canonical_manifest_core(manifest: &Manifest) -> ProtocolResult<String> {
    let security = json!({
        "mode": manifest.security.mode,
        "attestation_threshold": manifest.security.attestation_threshold,
        "vrf": manifest.security.vrf.as_ref().map(|v| v.identity().to_value()),
    });
    let core = json!({
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
        "security": security,
        "anchor": serde_json::to_value(&manifest.anchor)?,
        "metadata": manifest.metadata,
    });
    Ok(canonicalize(&core))
}

/// Canonical core of a control payload: the raw payload with its scope,
/// sequence and proof identity overridden.
pub fn canonical_control_core(
    payload: &Map<String, Value>,
    channel: &str,
    platform: &str,
    sequence: u64,
    identity: &VrfIdentity,
) -> String {
    let mut core = payload.clone();
    core.insert("channel".to_string(), json!(channel));
    core.insert("platform".to_string(), json!(platform));
    core.insert("sequence".to_string(), json!(sequence));
    core.insert("vrf".to_string(), identity.to_value());
    canonicalize(&Value::Object(core))
}

/// Chain-linked input for a core at a position.
pub fn build_vrf_input(core: &str, position: &ChainPosition) -> String {
    let core_hash = sha256_hex(core);
    let sequence = position.sequence.to_string();
    let prev_hash = position.prev_manifest_hash.to_lowercase();
    let prev_output = position.prev_vrf_output_hex.to_lowercase();
    let parts: Vec<&str> = VRF_DOMAIN
        .iter()
        .copied()
        .chain([
            position.channel.as_str(),
            position.platform.as_str(),
            sequence.as_str(),
            prev_hash.as_str(),
            prev_output.as_str(),
            core_hash.as_str(),
        ])
        .collect();
    sha256_hex(parts.join("|"))
}

/// Sign the raw input bytes; returns the base64 proof.
pub fn prove_vrf(input_hex: &str, keypair: &Ed25519KeyPair) -> ProtocolResult<String> {
    let input = decode_hex(input_hex)?;
    Ok(keypair.sign(&input).to_base64())
}

/// Verify a proof. Any decoding or key error is a failed verification.
pub fn verify_vrf(input_hex: &str, proof_base64: &str, public_key_hex: &str) -> bool {
    let (Ok(input), Ok(signature), Ok(key)) = (
        decode_hex(input_hex),
        Ed25519Signature::from_base64(proof_base64),
        Ed25519PublicKey::from_hex(public_key_hex),
    ) else {
        return false;
    };
    key.verify(&input, &signature).is_ok()
}

/// Output derived from a proof.
pub fn derive_vrf_output(proof_base64: &str) -> ProtocolResult<String> {
    Ok(sha256_hex(decode_base64(proof_base64)?))
}

/// Hash of the full manifest, the value the next entry links to.
pub fn hash_manifest_for_chain(manifest: &Manifest) -> ProtocolResult<String> {
    Ok(canonical_hash(&manifest.to_value()?))
}

/// Hash of a raw control payload, the value the next entry links to.
pub fn hash_control_payload(payload: &Map<String, Value>) -> String {
    canonical_hash(&Value::Object(payload.clone()))
}

/// Result of sealing a chain entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEntry {
    /// Sequence consumed.
    pub sequence: u64,
    /// Hash the next entry must reference.
    pub entry_hash: String,
    /// Output the next entry must reference.
    pub vrf_output_hex: String,
}

/// Turn `manifest` into a `vrf_chain_v1` manifest extending `prev`.
///
/// Legacy security fields are cleared and a full proof block is attached.
pub fn seal_manifest(
    manifest: &mut Manifest,
    keypair: &Ed25519KeyPair,
    publisher_peer_id: &str,
    prev_manifest_hash: &str,
    prev_vrf_output_hex: &str,
) -> ProtocolResult<SealedEntry> {
    let identity = VrfIdentity::new(
        publisher_peer_id,
        &keypair.public_key().to_hex(),
        prev_manifest_hash,
        prev_vrf_output_hex,
    );
    manifest.security.mode = SecurityMode::VrfChainV1;
    manifest.security.threshold = 0;
    manifest.security.committee_keys.clear();
    manifest.security.signatures.clear();
    manifest.security.publisher_pubkey = None;
    manifest.security.next_publisher_pubkey_sha256 = None;
    manifest.security.vrf = Some(identity.placeholder_proof());

    let input = build_vrf_input(
        &canonical_manifest_core(manifest)?,
        &ChainPosition {
            channel: manifest.channel.clone(),
            platform: manifest.platform.clone(),
            sequence: manifest.sequence,
            prev_manifest_hash: identity.prev_manifest_hash.clone(),
            prev_vrf_output_hex: identity.prev_vrf_output_hex.clone(),
        },
    );
    let proof = prove_vrf(&input, keypair)?;
    let output = derive_vrf_output(&proof)?;
    if let Some(vrf) = manifest.security.vrf.as_mut() {
        vrf.vrf_input_hex = input;
        vrf.vrf_proof_base64 = proof;
        vrf.vrf_output_hex = output.clone();
    }
    Ok(SealedEntry {
        sequence: manifest.sequence,
        entry_hash: hash_manifest_for_chain(manifest)?,
        vrf_output_hex: output,
    })
}

/// Attach scope, sequence and a proof block to a control payload.
#[allow(clippy::too_many_arguments)]
pub fn seal_control(
    payload: &mut Map<String, Value>,
    channel: &str,
    platform: &str,
    sequence: u64,
    keypair: &Ed25519KeyPair,
    publisher_peer_id: &str,
    prev_manifest_hash: &str,
    prev_vrf_output_hex: &str,
) -> ProtocolResult<SealedEntry> {
    let identity = VrfIdentity::new(
        publisher_peer_id,
        &keypair.public_key().to_hex(),
        prev_manifest_hash,
        prev_vrf_output_hex,
    );
    payload.insert("channel".to_string(), json!(channel));
    payload.insert("platform".to_string(), json!(platform));
    payload.insert("sequence".to_string(), json!(sequence));

    let core = canonical_control_core(payload, channel, platform, sequence, &identity);
    let input = build_vrf_input(
        &core,
        &ChainPosition {
            channel: channel.to_string(),
            platform: platform.to_string(),
            sequence,
            prev_manifest_hash: identity.prev_manifest_hash.clone(),
            prev_vrf_output_hex: identity.prev_vrf_output_hex.clone(),
        },
    );
    let proof = prove_vrf(&input, keypair)?;
    let output = derive_vrf_output(&proof)?;
    let mut block = identity.placeholder_proof();
    block.vrf_input_hex = input;
    block.vrf_proof_base64 = proof;
    block.vrf_output_hex = output.clone();
    payload.insert("vrf".to_string(), serde_json::to_value(block)?);

    Ok(SealedEntry {
        sequence,
        entry_hash: hash_control_payload(payload),
        vrf_output_hex: output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::manifest::parse_manifest;

    fn manifest(sequence: u64) -> Manifest {
        parse_manifest(&json!({
            "schema_version": 2,
            "channel": "stable",
            "platform": "android",
            "sequence": sequence,
            "version": format!("1.0.{}", sequence),
            "artifacts": [{"uri": "ipfs://bafy", "sha256": "aa"}],
            "metadata": {"release_notes": {"summary": "s", "details": "d", "published_at_ms": 1}}
        }))
        .unwrap()
    }

    #[test]
    fn test_seal_manifest_produces_verifiable_proof() {
        let keypair = Ed25519KeyPair::from_seed([1u8; 32]);
        let mut m = manifest(1);
        let sealed = seal_manifest(&mut m, &keypair, "peer-1", GENESIS_HASH, GENESIS_HASH).unwrap();

        let vrf = m.security.vrf.clone().unwrap();
        assert!(m.is_chain_valid_shape());
        assert!(verify_vrf(&vrf.vrf_input_hex, &vrf.vrf_proof_base64, &vrf.vrf_public_key_hex));
        assert_eq!(derive_vrf_output(&vrf.vrf_proof_base64).unwrap(), vrf.vrf_output_hex);
        assert_eq!(sealed.vrf_output_hex, vrf.vrf_output_hex);
        assert_eq!(sealed.entry_hash, hash_manifest_for_chain(&m).unwrap());

        let reparsed = parse_manifest(&m.to_value().unwrap()).unwrap();
        assert_eq!(hash_manifest_for_chain(&reparsed).unwrap(), sealed.entry_hash);
    }

    #[test]
    fn test_core_ignores_runtime_fields() {
        let keypair = Ed25519KeyPair::from_seed([2u8; 32]);
        let mut m = manifest(1);
        seal_manifest(&mut m, &keypair, "peer", GENESIS_HASH, GENESIS_HASH).unwrap();
        let core = canonical_manifest_core(&m).unwrap();

        let mut tampered = m.clone();
        if let Some(vrf) = tampered.security.vrf.as_mut() {
            vrf.vrf_output_hex = "f".repeat(64);
        }
        assert_eq!(canonical_manifest_core(&tampered).unwrap(), core);

        tampered.version = "9.9.9".into();
        assert_ne!(canonical_manifest_core(&tampered).unwrap(), core);
    }

    #[test]
    fn test_input_depends_on_position() {
        let position = ChainPosition {
            channel: "stable".into(),
            platform: "android".into(),
            sequence: 1,
            prev_manifest_hash: GENESIS_HASH.into(),
            prev_vrf_output_hex: GENESIS_HASH.into(),
        };
        let a = build_vrf_input("{}", &position);
        assert_eq!(a, build_vrf_input("{}", &position));

        let moved = ChainPosition { sequence: 2, ..position.clone() };
        assert_ne!(a, build_vrf_input("{}", &moved));

        let upper = ChainPosition {
            prev_manifest_hash: "A".repeat(64),
            ..position.clone()
        };
        let lower = ChainPosition {
            prev_manifest_hash: "a".repeat(64),
            ..position
        };
        assert_eq!(build_vrf_input("{}", &upper), build_vrf_input("{}", &lower));
    }

    #[test]
    fn test_verify_vrf_never_panics() {
        assert!(!verify_vrf("zz", "!!", "00"));
        assert!(!verify_vrf(GENESIS_HASH, "", GENESIS_HASH));
    }

    #[test]
    fn test_seal_control() {
        let keypair = Ed25519KeyPair::from_seed([3u8; 32]);
        let mut payload = json!({"kind": "revocation_v2", "manifest_id": "mf-1", "reason": "bad"})
            .as_object()
            .cloned()
            .unwrap();
        let sealed = seal_control(&mut payload, "stable", "android", 2, &keypair, "peer", GENESIS_HASH, GENESIS_HASH).unwrap();

        assert_eq!(payload.get("sequence"), Some(&json!(2)));
        let vrf = crate::domain::manifest::parse_vrf_proof(payload.get("vrf").unwrap()).unwrap();
        let core = canonical_control_core(&payload, "stable", "android", 2, &vrf.identity());
        let input = build_vrf_input(
            &core,
            &ChainPosition {
                channel: "stable".into(),
                platform: "android".into(),
                sequence: 2,
                prev_manifest_hash: GENESIS_HASH.into(),
                prev_vrf_output_hex: GENESIS_HASH.into(),
            },
        );
        assert_eq!(input, vrf.vrf_input_hex);
        assert!(verify_vrf(&input, &vrf.vrf_proof_base64, &vrf.vrf_public_key_hex));
        assert_eq!(sealed.entry_hash, hash_control_payload(&payload));
    }
}

//! # Update Verifier Service
//!
//! Implements [`UpdateVerificationApi`] over the pure algorithms, holding
//! the nonce history and device id behind an optional storage port.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use update_protocol::{ChainHead, Envelope, Manifest, SecurityMode};

use crate::algorithms::{self, NonceHistory};
use crate::config::VerifierConfig;
use crate::domain::{ChainAdvance, VerifyError, VersionBaseline};
use crate::ports::{UpdateVerificationApi, VerifierStorage};

/// Device id used when nothing can be persisted.
pub const EPHEMERAL_DEVICE_ID: &str = "ephemeral-device";

/// Verifier service.
pub struct UpdateVerifier {
    config: VerifierConfig,
    nonces: Mutex<NonceHistory>,
    device_id: Mutex<Option<String>>,
    storage: Option<Arc<dyn VerifierStorage>>,
}

impl UpdateVerifier {
    /// Verifier backed by `storage`. Persisted nonces are loaded eagerly.
    pub fn new(config: VerifierConfig, storage: Option<Arc<dyn VerifierStorage>>) -> Self {
        let records = match storage.as_ref().map(|s| s.load_nonces()) {
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                warn!("[update-verifier] nonce history unreadable, starting empty: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };
        let nonces = NonceHistory::from_records(records, config.nonce_capacity, config.nonce_ttl_ms);
        Self {
            config,
            nonces: Mutex::new(nonces),
            device_id: Mutex::new(None),
            storage,
        }
    }

    /// Verifier with no persistence.
    pub fn in_memory(config: VerifierConfig) -> Self {
        Self::new(config, None)
    }

    /// Configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Configured genesis head.
    pub fn genesis_head(&self) -> ChainHead {
        self.config.genesis_head()
    }

    /// Number of tracked nonces.
    pub fn tracked_nonces(&self) -> usize {
        self.nonces.lock().len()
    }

    fn persist_nonces(&self, history: &NonceHistory) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_nonces(history.records()) {
                warn!("[update-verifier] failed to persist nonce history: {}", e);
            }
        }
    }
}

impl UpdateVerificationApi for UpdateVerifier {
    fn register_envelope_nonce(&self, nonce: &str, expires_at_ms: u64, now_ms: u64) -> bool {
        if nonce.trim().is_empty() {
            return true;
        }
        let mut history = self.nonces.lock();
        let accepted = history.register(nonce, expires_at_ms, now_ms);
        if accepted {
            self.persist_nonces(&history);
        }
        accepted
    }

    fn verify_envelope_security(
        &self,
        envelope: &Envelope,
        now_ms: u64,
        require_signature: bool,
    ) -> Result<(), VerifyError> {
        if envelope.is_expired(now_ms) {
            return Err(VerifyError::Expired);
        }
        if envelope.payload_hash.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(VerifyError::PayloadHashMissing);
        }
        if !envelope.payload_hash_matches() {
            return Err(VerifyError::PayloadHashMismatch);
        }
        if require_signature && !envelope.verify_signature() {
            return Err(VerifyError::EnvelopeSignatureInvalid);
        }
        if !self.register_envelope_nonce(&envelope.nonce, envelope.expires_at_ms, now_ms) {
            debug!("[update-verifier] replayed nonce {}", envelope.nonce);
            return Err(VerifyError::ReplayedNonce);
        }
        Ok(())
    }

    fn verify_manifest_security(&self, manifest: &Manifest, baseline: &VersionBaseline) -> Result<(), VerifyError> {
        if manifest.security.mode != SecurityMode::VrfChainV1 {
            if !self.config.legacy_signature_accept {
                return Err(VerifyError::LegacyModeRejected);
            }
            let threshold = algorithms::verify_manifest_threshold(manifest);
            if !threshold.ok {
                debug!(
                    "[update-verifier] {} has {}/{} valid signatures",
                    manifest.manifest_id,
                    threshold.matched_signers.len(),
                    threshold.required
                );
                return Err(VerifyError::ThresholdNotMet);
            }
        }

        if baseline.is_present() && !baseline.is_exceeded_by(manifest) {
            return Err(VerifyError::RollbackRejected);
        }
        Ok(())
    }

    fn verify_vrf_chain_candidate(&self, manifest: &Manifest, head: &ChainHead) -> Result<ChainAdvance, VerifyError> {
        let head = head.normalized(&self.genesis_head());
        algorithms::verify_vrf_chain_candidate(manifest, &head, self.config.strict_contiguous)
    }

    fn verify_control_vrf(
        &self,
        payload: &Map<String, Value>,
        channel: &str,
        platform: &str,
        head: &ChainHead,
    ) -> Result<ChainAdvance, VerifyError> {
        let head = head.normalized(&self.genesis_head());
        algorithms::verify_control_vrf(payload, channel, platform, &head)
    }

    fn device_id(&self) -> String {
        let mut cached = self.device_id.lock();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }
        let Some(storage) = &self.storage else {
            return EPHEMERAL_DEVICE_ID.to_string();
        };
        let id = match storage.load_device_id() {
            Ok(Some(id)) => id,
            Ok(None) => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Err(e) = storage.save_device_id(&id) {
                    warn!("[update-verifier] failed to persist device id: {}", e);
                }
                id
            }
            Err(e) => {
                warn!("[update-verifier] device id unreadable: {}", e);
                return EPHEMERAL_DEVICE_ID.to_string();
            }
        };
        *cached = Some(id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryVerifierStorage;
    use serde_json::json;
    use update_crypto::Ed25519KeyPair;
    use update_protocol::{parse_manifest, seal_manifest, sign_manifest};

    fn signed_envelope(nonce: &str, expires_at_ms: u64) -> Envelope {
        let payload = json!({"kind": "manifest_v2", "sequence": 1}).as_object().cloned().unwrap();
        let mut envelope = Envelope::seal(payload, nonce, expires_at_ms);
        envelope.sign(&Ed25519KeyPair::from_seed([9u8; 32]));
        envelope
    }

    fn verifier() -> UpdateVerifier {
        UpdateVerifier::in_memory(VerifierConfig::for_testing())
    }

    fn chain_manifest(version: &str, code: u64, sequence: u64) -> Manifest {
        let mut m = parse_manifest(&json!({
            "schema_version": 2,
            "sequence": sequence,
            "version": version,
            "version_code": code,
            "artifacts": [{"uri": "ipfs://a"}]
        }))
        .unwrap();
        let genesis = ChainHead::default();
        seal_manifest(
            &mut m,
            &Ed25519KeyPair::from_seed([1u8; 32]),
            "peer",
            &genesis.last_manifest_hash,
            &genesis.last_vrf_output_hex,
        )
        .unwrap();
        m
    }

    #[test]
    fn test_envelope_accepted_then_replayed() {
        let v = verifier();
        let envelope = signed_envelope("n-1", 10_000);
        assert_eq!(v.verify_envelope_security(&envelope, 1_000, true), Ok(()));
        assert_eq!(v.verify_envelope_security(&envelope, 1_001, true), Err(VerifyError::ReplayedNonce));
    }

    #[test]
    fn test_envelope_check_order() {
        let v = verifier();

        let envelope = signed_envelope("n", 500);
        assert_eq!(v.verify_envelope_security(&envelope, 1_000, true), Err(VerifyError::Expired));

        let mut missing = signed_envelope("n", 10_000);
        missing.payload_hash = None;
        assert_eq!(v.verify_envelope_security(&missing, 1_000, true), Err(VerifyError::PayloadHashMissing));

        let mut tampered = signed_envelope("n", 10_000);
        tampered.payload.insert("sequence".into(), json!(2));
        assert_eq!(v.verify_envelope_security(&tampered, 1_000, true), Err(VerifyError::PayloadHashMismatch));

        let mut unsigned = signed_envelope("n", 10_000);
        unsigned.signature = None;
        assert_eq!(
            v.verify_envelope_security(&unsigned, 1_000, true),
            Err(VerifyError::EnvelopeSignatureInvalid)
        );

        // None of the failures consumed the nonce.
        assert_eq!(v.tracked_nonces(), 0);
    }

    #[test]
    fn test_unsigned_envelope_when_signature_optional() {
        let v = verifier();
        let mut envelope = signed_envelope("n", 10_000);
        envelope.signature = None;
        assert_eq!(v.verify_envelope_security(&envelope, 1_000, false), Ok(()));
    }

    #[test]
    fn test_legacy_mode_rejected_by_default() {
        let v = verifier();
        let m = parse_manifest(&json!({"version": "1.0", "apk_cid": "bafy"})).unwrap();
        assert_eq!(
            v.verify_manifest_security(&m, &VersionBaseline::default()),
            Err(VerifyError::LegacyModeRejected)
        );
    }

    #[test]
    fn test_legacy_accept_requires_threshold() {
        let v = UpdateVerifier::in_memory(VerifierConfig {
            legacy_signature_accept: true,
            ..VerifierConfig::for_testing()
        });
        let key = Ed25519KeyPair::from_seed([4u8; 32]);
        let mut m = parse_manifest(&json!({
            "schema_version": 2,
            "sequence": 1,
            "artifacts": [{"uri": "ipfs://a"}],
            "security": {"mode": "committee_threshold", "threshold": 1}
        }))
        .unwrap();
        assert_eq!(
            v.verify_manifest_security(&m, &VersionBaseline::default()),
            Err(VerifyError::ThresholdNotMet)
        );
        sign_manifest(&mut m, &key).unwrap();
        assert_eq!(v.verify_manifest_security(&m, &VersionBaseline::default()), Ok(()));
    }

    #[test]
    fn test_rollback_rejected() {
        let v = verifier();
        let baseline = VersionBaseline {
            version: Some("1.2.0".into()),
            version_code: Some(120),
            sequence: 5,
        };
        assert_eq!(
            v.verify_manifest_security(&chain_manifest("1.2.0", 120, 6), &baseline),
            Err(VerifyError::RollbackRejected)
        );
        assert_eq!(
            v.verify_manifest_security(&chain_manifest("1.1.0", 110, 7), &baseline),
            Err(VerifyError::RollbackRejected)
        );
        assert_eq!(v.verify_manifest_security(&chain_manifest("1.3.0", 130, 6), &baseline), Ok(()));
        assert_eq!(
            v.verify_manifest_security(&chain_manifest("1.0.0", 1, 1), &VersionBaseline::default()),
            Ok(())
        );
    }

    #[test]
    fn test_chain_candidate_uses_normalized_head() {
        let v = verifier();
        let m = chain_manifest("1.0.0", 1, 1);
        let loaded = ChainHead::at(0, "garbage", "garbage", 0);
        let advance = v.verify_vrf_chain_candidate(&m, &loaded).unwrap();
        assert_eq!(advance.sequence, 1);
    }

    #[test]
    fn test_nonces_persist_across_instances() {
        let storage = Arc::new(InMemoryVerifierStorage::new());
        let first = UpdateVerifier::new(VerifierConfig::for_testing(), Some(storage.clone()));
        assert!(first.register_envelope_nonce("n", 0, 1_000));

        let second = UpdateVerifier::new(VerifierConfig::for_testing(), Some(storage));
        assert!(!second.register_envelope_nonce("n", 0, 2_000));
    }

    #[test]
    fn test_device_id() {
        assert_eq!(verifier().device_id(), EPHEMERAL_DEVICE_ID);

        let storage = Arc::new(InMemoryVerifierStorage::new());
        let v = UpdateVerifier::new(VerifierConfig::for_testing(), Some(storage.clone()));
        let id = v.device_id();
        assert_eq!(id.len(), 36);
        assert_eq!(v.device_id(), id);

        let again = UpdateVerifier::new(VerifierConfig::for_testing(), Some(storage));
        assert_eq!(again.device_id(), id);
    }

    #[test]
    fn test_storage_failure_does_not_block_registration() {
        let storage = Arc::new(InMemoryVerifierStorage::failing());
        let v = UpdateVerifier::new(VerifierConfig::for_testing(), Some(storage));
        assert!(v.register_envelope_nonce("n", 0, 1));
        assert!(!v.register_envelope_nonce("n", 0, 2));
    }
}

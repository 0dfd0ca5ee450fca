//! # Update Envelope
//!
//! Anti-replay wrapper around any update payload: a nonce, an expiry, the
//! hash of the canonical payload and an optional legacy signature.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use update_crypto::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

use super::errors::{ProtocolError, ProtocolResult};
use super::fields;
use crate::algorithms::canonical::{canonical_hash, canonicalize};

/// Default envelope kind.
pub const ENVELOPE_KIND: &str = "update_envelope_v2";

/// Envelope around a manifest or control message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind.
    pub kind: String,
    /// Schema version.
    pub schema_version: u32,
    /// Replay key.
    pub nonce: String,
    /// Expiry, 0 for none.
    pub expires_at_ms: u64,
    /// Signer public key (hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// Signature over [`Envelope::signing_canonical`] (base64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// SHA-256 of the canonical payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    /// Wrapped payload.
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Wrap a payload, filling in its hash.
    pub fn seal(payload: Map<String, Value>, nonce: impl Into<String>, expires_at_ms: u64) -> Self {
        let payload_hash = canonical_hash(&Value::Object(payload.clone()));
        Self {
            kind: ENVELOPE_KIND.to_string(),
            schema_version: 2,
            nonce: nonce.into(),
            expires_at_ms,
            signer: None,
            signature: None,
            payload_hash: Some(payload_hash),
            payload,
        }
    }

    /// A string `nonce` and some `payload` are present.
    pub fn is_likely(value: &Value) -> bool {
        value
            .as_object()
            .map(|obj| obj.get("nonce").map_or(false, Value::is_string) && obj.contains_key("payload"))
            .unwrap_or(false)
    }

    /// Parse an envelope. The payload may be an object or JSON text of one.
    pub fn parse(value: &Value) -> ProtocolResult<Self> {
        if !Self::is_likely(value) {
            return Err(ProtocolError::NotRecognized("envelope"));
        }
        let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
        let payload = obj
            .get("payload")
            .and_then(fields::object_or_json_text)
            .ok_or(ProtocolError::MissingField("payload"))?;
        let nonce = fields::text_strict(obj, &["nonce"]).ok_or(ProtocolError::MissingField("nonce"))?;
        Ok(Self {
            kind: fields::text(obj, &["kind"]).unwrap_or_else(|| ENVELOPE_KIND.to_string()),
            schema_version: fields::uint(obj, &["schema_version"]).unwrap_or(2) as u32,
            nonce,
            expires_at_ms: fields::uint(obj, &["expires_at_ms"]).unwrap_or(0),
            signer: fields::text_strict(obj, &["signer"]),
            signature: fields::text_strict(obj, &["signature"]),
            payload_hash: fields::text_strict(obj, &["payload_hash"]),
            payload,
        })
    }

    /// Expired iff an expiry is set and `now_ms` is past it.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms > 0 && now_ms > self.expires_at_ms
    }

    /// Hash of the canonical payload.
    pub fn computed_payload_hash(&self) -> String {
        canonical_hash(&Value::Object(self.payload.clone()))
    }

    /// Declared hash matches the payload, case-insensitively.
    pub fn payload_hash_matches(&self) -> bool {
        self.payload_hash
            .as_deref()
            .map_or(false, |declared| declared.eq_ignore_ascii_case(&self.computed_payload_hash()))
    }

    /// Canonical text covered by the envelope signature.
    pub fn signing_canonical(&self) -> String {
        canonicalize(&json!({
            "kind": self.kind,
            "schema_version": self.schema_version,
            "nonce": self.nonce,
            "expires_at_ms": self.expires_at_ms,
            "signer": self.signer,
            "payload_hash": self.payload_hash,
        }))
    }

    /// Sign with `keypair`, recording its public key as signer.
    pub fn sign(&mut self, keypair: &Ed25519KeyPair) {
        self.signer = Some(keypair.public_key().to_hex());
        let signature = keypair.sign(self.signing_canonical().as_bytes());
        self.signature = Some(signature.to_base64());
    }

    /// Verify the legacy signature. Never errors.
    pub fn verify_signature(&self) -> bool {
        let (Some(signer), Some(signature)) = (self.signer.as_deref(), self.signature.as_deref()) else {
            return false;
        };
        let Ok(key) = Ed25519PublicKey::from_hex(signer) else {
            return false;
        };
        let Ok(sig) = Ed25519Signature::from_base64(signature) else {
            return false;
        };
        key.verify(self.signing_canonical().as_bytes(), &sig).is_ok()
    }

    /// Payload as a JSON value.
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Map<String, Value> {
        json!({"kind": "manifest_v2", "sequence": 1})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_seal_and_hash() {
        let envelope = Envelope::seal(payload(), "n-1", 0);
        assert!(envelope.payload_hash_matches());
        assert!(!envelope.is_expired(u64::MAX));
    }

    #[test]
    fn test_parse_string_payload_and_defaults() {
        let raw = json!({
            "nonce": "  n-2 ",
            "payload": "{\"a\":1}",
            "payload_hash": "",
            "expires_at_ms": "100"
        });
        let envelope = Envelope::parse(&raw).unwrap();
        assert_eq!(envelope.kind, ENVELOPE_KIND);
        assert_eq!(envelope.schema_version, 2);
        assert_eq!(envelope.nonce, "n-2");
        assert_eq!(envelope.payload_hash, None);
        assert!(!envelope.payload_hash_matches());
        assert!(envelope.is_expired(101));
        assert!(!envelope.is_expired(100));
    }

    #[test]
    fn test_parse_rejects() {
        assert!(Envelope::parse(&json!({"payload": {}})).is_err());
        assert!(Envelope::parse(&json!({"nonce": " ", "payload": {}})).is_err());
        assert!(Envelope::parse(&json!({"nonce": "n", "payload": "[1]"})).is_err());
    }

    #[test]
    fn test_uppercase_hash_matches() {
        let mut envelope = Envelope::seal(payload(), "n", 0);
        envelope.payload_hash = envelope.payload_hash.map(|h| h.to_uppercase());
        assert!(envelope.payload_hash_matches());
        envelope.payload.insert("sequence".into(), json!(2));
        assert!(!envelope.payload_hash_matches());
    }

    #[test]
    fn test_signature() {
        let keypair = Ed25519KeyPair::from_seed([9u8; 32]);
        let mut envelope = Envelope::seal(payload(), "n-3", 10);
        assert!(!envelope.verify_signature());

        envelope.sign(&keypair);
        assert!(envelope.verify_signature());

        let reparsed = Envelope::parse(&envelope.to_value().unwrap()).unwrap();
        assert!(reparsed.verify_signature());

        envelope.nonce = "n-4".into();
        assert!(!envelope.verify_signature());
    }
}

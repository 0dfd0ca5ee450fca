//! Tagged parsing of update payloads.

use serde_json::Value;

use super::control::{Attestation, KillSwitch, Revocation};
use super::errors::{ProtocolError, ProtocolResult};
use super::fields;
use super::manifest::{is_likely_manifest_v2, parse_manifest, Manifest};
use super::topics::TopicKind;

/// A parsed update payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdatePayload {
    /// Update manifest.
    Manifest(Manifest),
    /// Revocation.
    Revocation(Revocation),
    /// Kill-switch.
    KillSwitch(KillSwitch),
    /// Attestation.
    Attestation(Attestation),
}

impl UpdatePayload {
    /// Parse as a specific kind.
    pub fn parse_as(kind: TopicKind, value: &Value) -> ProtocolResult<Self> {
        match kind {
            TopicKind::Manifest => parse_manifest(value).map(UpdatePayload::Manifest),
            TopicKind::Attestation => Attestation::parse(value).map(UpdatePayload::Attestation),
            TopicKind::Revoke => Revocation::parse(value).map(UpdatePayload::Revocation),
            TopicKind::KillSwitch => KillSwitch::parse(value).map(UpdatePayload::KillSwitch),
        }
    }

    /// Parse without a kind hint.
    ///
    /// Strict shapes are tried first; the legacy manifest mapping is last.
    pub fn parse(value: &Value) -> ProtocolResult<Self> {
        let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
        let kind = fields::text(obj, &["kind"]).unwrap_or_default().to_lowercase();
        let hinted = if kind.contains("attestation") {
            Some(TopicKind::Attestation)
        } else if kind.contains("killswitch") || kind.contains("kill_switch") {
            Some(TopicKind::KillSwitch)
        } else if kind.contains("revoke") || kind.contains("revocation") {
            Some(TopicKind::Revoke)
        } else if is_likely_manifest_v2(obj) {
            Some(TopicKind::Manifest)
        } else if Attestation::is_likely(obj) {
            Some(TopicKind::Attestation)
        } else if KillSwitch::is_likely(obj) {
            Some(TopicKind::KillSwitch)
        } else {
            None
        };
        if let Some(kind) = hinted {
            return Self::parse_as(kind, value);
        }
        match parse_manifest(value) {
            Ok(manifest) => Ok(UpdatePayload::Manifest(manifest)),
            Err(_) if Revocation::is_likely(obj) => Revocation::parse(value).map(UpdatePayload::Revocation),
            Err(_) => Err(ProtocolError::NotRecognized("update payload")),
        }
    }

    /// Topic kind this payload travels on.
    pub fn topic_kind(&self) -> TopicKind {
        match self {
            UpdatePayload::Manifest(_) => TopicKind::Manifest,
            UpdatePayload::Revocation(_) => TopicKind::Revoke,
            UpdatePayload::KillSwitch(_) => TopicKind::KillSwitch,
            UpdatePayload::Attestation(_) => TopicKind::Attestation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_by_kind() {
        let a = UpdatePayload::parse(&json!({"kind": "attestation_v2", "manifest_id": "m", "attestor": "p"})).unwrap();
        assert_eq!(a.topic_kind(), TopicKind::Attestation);

        let k = UpdatePayload::parse(&json!({"kind": "killswitch_v2"})).unwrap();
        assert_eq!(k.topic_kind(), TopicKind::KillSwitch);

        let r = UpdatePayload::parse(&json!({"kind": "revoke_v2", "manifest_id": "m"})).unwrap();
        assert_eq!(r.topic_kind(), TopicKind::Revoke);
    }

    #[test]
    fn test_dispatch_by_shape() {
        let m = UpdatePayload::parse(&json!({"schema_version": 2, "artifacts": [{"uri": "u"}]})).unwrap();
        assert_eq!(m.topic_kind(), TopicKind::Manifest);

        let legacy = UpdatePayload::parse(&json!({"url": "https://x", "versionCode": 1})).unwrap();
        assert_eq!(legacy.topic_kind(), TopicKind::Manifest);

        let r = UpdatePayload::parse(&json!({"max_sequence": 3})).unwrap();
        assert_eq!(r.topic_kind(), TopicKind::Revoke);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            UpdatePayload::parse(&json!({"hello": "world"})),
            Err(ProtocolError::NotRecognized("update payload"))
        );
        assert_eq!(UpdatePayload::parse(&json!(null)), Err(ProtocolError::NotAnObject));
    }
}

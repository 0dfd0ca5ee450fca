//! Release-notes gate.

use serde_json::{Map, Value};
use update_protocol::{Manifest, ReleaseNotes};

use crate::domain::{PublishError, PublisherResult};

/// Require release notes on `manifest` and rewrite them in normalized form
/// under `metadata.release_notes`.
pub fn require_release_notes(manifest: &mut Manifest) -> PublisherResult<ReleaseNotes> {
    let notes = manifest.release_notes().ok_or(PublishError::ReleaseNotesRequired)?;
    let metadata = manifest.metadata.get_or_insert_with(Map::new);
    metadata.remove("releaseNotes");
    metadata.insert(
        "release_notes".to_string(),
        serde_json::to_value(&notes).map_err(update_protocol::ProtocolError::from)?,
    );
    Ok(notes)
}

/// True when `value` has usable release notes.
pub fn has_release_notes(value: &Value) -> bool {
    ReleaseNotes::from_value(value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use update_protocol::parse_manifest;

    fn manifest(metadata: Value) -> Manifest {
        parse_manifest(&json!({
            "schema_version": 2,
            "channel": "stable",
            "platform": "android",
            "sequence": 1,
            "version": "1.0.0",
            "artifacts": [{"uri": "ipfs://bafy", "sha256": "aa"}],
            "metadata": metadata
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_notes_rejected() {
        let mut m = manifest(json!({}));
        assert!(matches!(
            require_release_notes(&mut m),
            Err(PublishError::ReleaseNotesRequired)
        ));
        let mut blank = manifest(json!({"release_notes": {"summary": " ", "details": "d"}}));
        assert!(require_release_notes(&mut blank).is_err());
    }

    #[test]
    fn test_notes_normalized_in_place() {
        let mut m = manifest(json!({"releaseNotes": {"summary": "s", "details": "d", "publishedAtMs": 9}}));
        let notes = require_release_notes(&mut m).unwrap();
        assert_eq!(notes.published_at_ms, 9);
        let metadata = m.metadata.unwrap();
        assert!(metadata.get("releaseNotes").is_none());
        assert_eq!(metadata["release_notes"]["summary"], "s");
        assert!(has_release_notes(&metadata["release_notes"]));
    }
}

//! Artifact location and integrity.

use update_crypto::sha256_hex;

/// Map an artifact URI onto an HTTPS URL.
///
/// `http(s)://` passes through, `ipfs://` and `ipns://` and bare
/// `/ipfs/` or `/ipns/` paths resolve through `gateway`. Anything else is
/// returned unchanged.
pub fn to_gateway_url(raw: &str, gateway: &str) -> String {
    let uri = raw.trim();
    let gateway = gateway.trim().trim_end_matches('/');
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return uri.to_string();
    }
    if lower.starts_with("ipfs://") {
        return format!("{}/ipfs/{}", gateway, uri["ipfs://".len()..].trim_start_matches('/'));
    }
    if lower.starts_with("ipns://") {
        return format!("{}/ipns/{}", gateway, uri["ipns://".len()..].trim_start_matches('/'));
    }
    if lower.starts_with("/ipfs/") || lower.starts_with("/ipns/") {
        return format!("{}{}", gateway, uri);
    }
    uri.to_string()
}

/// Downloaded bytes hash to `expected` (hex, case-insensitive).
pub fn verify_artifact_hash(data: &[u8], expected: Option<&str>) -> bool {
    let Some(expected) = expected.map(str::trim).filter(|e| !e.is_empty()) else {
        return false;
    };
    sha256_hex(data).eq_ignore_ascii_case(expected)
}

/// Dedupe key of a control message.
pub fn control_key(kind: &str, channel: &str, platform: &str, sequence: u64, payload_hash: &str) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        kind,
        channel.to_lowercase(),
        platform.to_lowercase(),
        sequence,
        payload_hash
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const GW: &str = "https://ipfs.io/";

    #[test]
    fn test_gateway_mapping() {
        assert_eq!(to_gateway_url("ipfs://bafy123", GW), "https://ipfs.io/ipfs/bafy123");
        assert_eq!(to_gateway_url("ipns://updates.example", GW), "https://ipfs.io/ipns/updates.example");
        assert_eq!(to_gateway_url("/ipfs/bafy123/app.apk", GW), "https://ipfs.io/ipfs/bafy123/app.apk");
        assert_eq!(
            to_gateway_url(" https://cdn.example/app.apk ", GW),
            "https://cdn.example/app.apk"
        );
        assert_eq!(to_gateway_url("file:///tmp/a", GW), "file:///tmp/a");
    }

    #[test]
    fn test_artifact_hash() {
        let expected = sha256_hex(b"payload");
        assert!(verify_artifact_hash(b"payload", Some(&expected.to_uppercase())));
        assert!(!verify_artifact_hash(b"other", Some(&expected)));
        assert!(!verify_artifact_hash(b"payload", None));
        assert!(!verify_artifact_hash(b"payload", Some("  ")));
    }

    #[test]
    fn test_control_key_is_scope_insensitive_to_case() {
        assert_eq!(
            control_key("revoke", "Stable", "Android", 2, "ab"),
            control_key("revoke", "stable", "android", 2, "ab")
        );
        assert_ne!(
            control_key("revoke", "stable", "android", 2, "ab"),
            control_key("killswitch", "stable", "android", 2, "ab")
        );
    }
}

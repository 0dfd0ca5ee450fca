//! Hex and base64 helpers.
//!
//! Proofs travel as base64 and may arrive in either the standard or the
//! URL-safe alphabet, with or without padding.

use crate::CryptoError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Encode bytes as standard padded base64.
pub fn encode_base64(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard or URL-safe base64, padded or not.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CryptoError> {
    let normalized: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let unpadded = normalized.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(unpadded)
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}

/// Decode hex, case-insensitive, with an optional `0x` prefix.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(body).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

/// True for a 64-character lowercase hex string.
pub fn is_sha256_hex(text: &str) -> bool {
    text.len() == 64 && text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_alphabets() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let standard = encode_base64(&bytes);
        let url_safe = standard.replace('+', "-").replace('/', "_");
        let unpadded = standard.trim_end_matches('=');

        assert_eq!(decode_base64(&standard).unwrap(), bytes);
        assert_eq!(decode_base64(&url_safe).unwrap(), bytes);
        assert_eq!(decode_base64(unpadded).unwrap(), bytes);
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(decode_base64("***").is_err());
    }

    #[test]
    fn test_hex_prefix_and_case() {
        assert_eq!(decode_hex("0xABcd").unwrap(), vec![0xab, 0xcd]);
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_sha256_hex_shape() {
        assert!(is_sha256_hex(&"0".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex("abc"));
    }
}

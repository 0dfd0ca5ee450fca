//! # Ed25519 Signatures
//!
//! Publisher keys, envelope signatures and VRF chain proofs all use Ed25519.
//! Keys travel as lowercase hex, signatures as base64.

use crate::encoding::{decode_base64, decode_hex, encode_base64};
use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Parse a hex encoded key.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(text)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(array)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;

        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse a base64 signature in either alphabet.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = decode_base64(text)?;
        let array: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Standard base64 form.
    pub fn to_base64(&self) -> String {
        encode_base64(self.0)
    }
}

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Parse a hex secret.
    ///
    /// Accepts the 32-byte seed or the 64-byte `seed || public` form.
    pub fn from_secret_hex(text: &str) -> Result<Self, CryptoError> {
        let mut bytes = decode_hex(text)?;
        let result = match bytes.len() {
            32 | 64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes[..32]);
                let pair = Self::from_seed(seed);
                seed.zeroize();
                if bytes.len() == 64 && pair.public_key().as_bytes()[..] != bytes[32..] {
                    Err(CryptoError::InvalidPrivateKey)
                } else {
                    Ok(pair)
                }
            }
            other => Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: other,
            }),
        };
        bytes.zeroize();
        result
    }

    /// Get public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        let verifying_key = self.signing_key.verifying_key();
        Ed25519PublicKey(verifying_key.to_bytes())
    }

    /// Sign a message (deterministic).
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }

    /// Get secret seed (for serialization).
    pub fn to_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Hex form of the secret seed.
    pub fn to_secret_hex(&self) -> String {
        let mut seed = self.to_seed();
        let text = hex::encode(seed);
        seed.zeroize();
        text
    }
}

impl Clone for Ed25519KeyPair {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
        }
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &self.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

impl Drop for Ed25519KeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = Ed25519KeyPair::generate();
        let message = b"update manifest";

        let signature = keypair.sign(message);
        let result = keypair.public_key().verify(message, &signature);

        assert!(result.is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = Ed25519KeyPair::generate();

        let signature = keypair.sign(b"message1");
        let result = keypair.public_key().verify(b"message2", &signature);

        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = Ed25519KeyPair::generate();
        let keypair2 = Ed25519KeyPair::generate();

        let signature = keypair1.sign(b"test");
        let result = keypair2.public_key().verify(b"test", &signature);

        assert!(result.is_err());
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = Ed25519KeyPair::from_seed([0xABu8; 32]);

        let sig1 = keypair.sign(b"deterministic");
        let sig2 = keypair.sign(b"deterministic");

        assert_eq!(sig1.as_bytes(), sig2.as_bytes());
    }

    #[test]
    fn test_hex_public_key() {
        let keypair = Ed25519KeyPair::from_seed([7u8; 32]);
        let hex_key = keypair.public_key().to_hex();

        let parsed = Ed25519PublicKey::from_hex(&hex_key.to_uppercase()).unwrap();
        assert_eq!(parsed, keypair.public_key());
        assert!(matches!(
            Ed25519PublicKey::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_signature_from_url_safe_base64() {
        let keypair = Ed25519KeyPair::from_seed([3u8; 32]);
        let signature = keypair.sign(b"wire");
        let url_safe = signature
            .to_base64()
            .replace('+', "-")
            .replace('/', "_")
            .trim_end_matches('=')
            .to_string();

        assert_eq!(Ed25519Signature::from_base64(&url_safe).unwrap(), signature);
        assert!(Ed25519Signature::from_base64("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_secret_hex_forms() {
        let original = Ed25519KeyPair::generate();
        let seed_hex = original.to_secret_hex();
        let full_hex = format!("{}{}", seed_hex, original.public_key().to_hex());

        assert_eq!(
            Ed25519KeyPair::from_secret_hex(&seed_hex).unwrap().public_key(),
            original.public_key()
        );
        assert_eq!(
            Ed25519KeyPair::from_secret_hex(&full_hex).unwrap().public_key(),
            original.public_key()
        );

        let mismatched = format!("{}{}", seed_hex, "00".repeat(32));
        assert_eq!(
            Ed25519KeyPair::from_secret_hex(&mismatched).unwrap_err(),
            CryptoError::InvalidPrivateKey
        );
    }
}

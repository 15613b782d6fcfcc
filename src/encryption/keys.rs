//! Key handling: generation, fingerprints, constant-time comparison.

use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey},
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};

use super::CryptoError;

/// RSA key size in bits
const RSA_KEY_SIZE: usize = 2048;

/// RSA key pair for a reviewer. Generated wherever the private key will
/// live; the server only ever receives the public half.
pub struct RsaKeyPair {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
}

/// Generate a new RSA key pair (2048-bit).
pub fn generate_key_pair() -> Result<RsaKeyPair, CryptoError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_SIZE)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok(RsaKeyPair {
        private_key,
        public_key,
    })
}

/// Fingerprint of a public key given its SPKI DER encoding.
///
/// A pure function of the input bytes: identical keys always produce the
/// identical hex-encoded SHA-256 digest, which is what makes fingerprints
/// usable as lookup tags inside bundles.
pub fn fingerprint_public_key_der(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Fingerprint of an in-memory public key.
pub fn fingerprint_public_key(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(fingerprint_public_key_der(der.as_bytes()))
}

/// Fingerprint of the public key corresponding to a private key. Readers
/// use this to locate their own wrapped content key inside a bundle.
pub fn fingerprint_from_private_key(key: &RsaPrivateKey) -> Result<String, CryptoError> {
    fingerprint_public_key(&RsaPublicKey::from(key))
}

/// Parse a public key from SPKI DER bytes.
pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Encode a public key to SPKI DER bytes.
pub fn public_key_to_der(key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    Ok(key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?
        .as_bytes()
        .to_vec())
}

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Returns `false` if lengths differ (but still takes O(max(len1, len2))
/// time).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        // Still do a comparison to maintain constant time
        let max_len = std::cmp::max(a.len(), b.len());
        let mut _dummy = 0u8;
        for i in 0..max_len {
            let byte_a = a.get(i).copied().unwrap_or(0);
            let byte_b = b.get(i).copied().unwrap_or(0);
            _dummy |= byte_a ^ byte_b;
        }
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let pair = generate_key_pair().expect("key generation should succeed");
        let der = public_key_to_der(&pair.public_key).unwrap();

        let fp1 = fingerprint_public_key_der(&der);
        let fp2 = fingerprint_public_key_der(&der);
        assert_eq!(fp1, fp2);
        // SHA-256 digest is 32 bytes = 64 hex chars
        assert_eq!(fp1.len(), 64);
    }

    #[test]
    fn fingerprint_differs_across_keys() {
        let pair1 = generate_key_pair().unwrap();
        let pair2 = generate_key_pair().unwrap();

        let fp1 = fingerprint_public_key(&pair1.public_key).unwrap();
        let fp2 = fingerprint_public_key(&pair2.public_key).unwrap();
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn private_key_fingerprint_matches_public() {
        let pair = generate_key_pair().unwrap();

        let from_public = fingerprint_public_key(&pair.public_key).unwrap();
        let from_private = fingerprint_from_private_key(&pair.private_key).unwrap();
        assert_eq!(from_public, from_private);
    }

    #[test]
    fn der_round_trip() {
        let pair = generate_key_pair().unwrap();
        let der = public_key_to_der(&pair.public_key).unwrap();
        let imported = public_key_from_der(&der).unwrap();
        assert_eq!(imported, pair.public_key);
    }

    #[test]
    fn malformed_der_is_rejected() {
        assert!(public_key_from_der(b"not a key").is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hello!"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }
}

//! Multi-recipient envelope encryption for study artifacts
//!
//! This module provides:
//! - SHA-256 fingerprints of public keys, for recipient lookup
//! - `BundleWriter`: encrypt named entries once with a fresh content key,
//!   wrapping that key separately for every recipient (RSA-OAEP)
//! - `open_bundle`: locate your wrap by fingerprint, unwrap, decrypt
//!
//! # Security Notes
//! - The content key and all nonces are freshly generated per bundle
//! - Entries are protected with AES-256-GCM (authenticated); tampering
//!   fails decryption rather than yielding corrupt plaintext
//! - A reader only ever sees its own wrapped key; one recipient's
//!   compromise does not expose the wraps of the others

pub mod keys;
pub mod reader;
pub mod writer;

pub use keys::{constant_time_eq, fingerprint_from_private_key, fingerprint_public_key_der, generate_key_pair, RsaKeyPair};
pub use reader::open_bundle;
pub use writer::BundleWriter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One party authorized to decrypt a bundle: their public key (SPKI DER
/// bytes) and its deterministic fingerprint.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub public_key: Vec<u8>,
    pub fingerprint: String,
}

/// Name of the wrapped-key manifest inside a bundle.
pub(crate) const KEYS_MANIFEST_NAME: &str = "bundle-keys.json";

/// Prefix under which plaintext entry names are stored.
pub(crate) const ENTRY_PREFIX: &str = "entries/";

/// AES-GCM nonce length prepended to each encrypted entry.
pub(crate) const NONCE_SIZE: usize = 12;

/// Length of the symmetric content key.
pub(crate) const CONTENT_KEY_SIZE: usize = 32;

/// One row of the bundle's key manifest: the content key encrypted for a
/// single recipient, tagged by their fingerprint.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WrappedContentKey {
    pub fingerprint: String,
    /// Base64-encoded RSA-OAEP ciphertext of the content key.
    pub key: String,
}

/// Cryptographic errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid recipients: {0}")]
    InvalidRecipients(String),

    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("bundle error: {0}")]
    Bundle(String),
}

//! Bundle writer: encrypt entries once, wrap the content key per recipient.

use std::io::{Cursor, Write};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use super::keys::{fingerprint_public_key_der, public_key_from_der};
use super::{
    CryptoError, Recipient, WrappedContentKey, CONTENT_KEY_SIZE, ENTRY_PREFIX, KEYS_MANIFEST_NAME,
    NONCE_SIZE,
};

/// Builds one self-describing encrypted bundle for a set of recipients.
///
/// Every entry is encrypted with the same fresh content key; that key is
/// wrapped independently for each recipient, so any single recipient can
/// decrypt all entries with only their own private key.
pub struct BundleWriter {
    recipients: Vec<(RsaPublicKey, String)>,
    entries: Vec<(String, Vec<u8>)>,
}

impl BundleWriter {
    /// Fails with `InvalidRecipients` when the list is empty or any
    /// public key does not parse.
    pub fn new(recipients: &[Recipient]) -> Result<Self, CryptoError> {
        if recipients.is_empty() {
            return Err(CryptoError::InvalidRecipients(
                "at least one recipient is required".into(),
            ));
        }

        let mut parsed = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let key = public_key_from_der(&recipient.public_key).map_err(|e| {
                CryptoError::InvalidRecipients(format!(
                    "public key for {} is malformed: {e}",
                    recipient.fingerprint
                ))
            })?;
            // Tag the wrap with the fingerprint recomputed from the key
            // bytes, not the caller-supplied one, so the bundle stays
            // internally consistent even if the registry row was edited.
            parsed.push((key, fingerprint_public_key_der(&recipient.public_key)));
        }

        Ok(Self {
            recipients: parsed,
            entries: Vec::new(),
        })
    }

    pub fn add_entry(&mut self, name: impl Into<String>, plaintext: &[u8]) {
        self.entries.push((name.into(), plaintext.to_vec()));
    }

    /// Encrypt everything and produce the bundle bytes.
    pub fn finish(self) -> Result<Vec<u8>, CryptoError> {
        if self.entries.is_empty() {
            return Err(CryptoError::Bundle("bundle has no entries".into()));
        }

        let content_key: [u8; CONTENT_KEY_SIZE] = rand::random();
        let cipher = Aes256Gcm::new_from_slice(&content_key)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut wrapped_keys = Vec::with_capacity(self.recipients.len());
        for (public_key, fingerprint) in &self.recipients {
            let padding = Oaep::new::<Sha256>();
            let wrapped = public_key
                .encrypt(&mut OsRng, padding, &content_key)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;
            wrapped_keys.push(WrappedContentKey {
                fingerprint: fingerprint.clone(),
                key: BASE64.encode(wrapped),
            });
        }

        // Ciphertext doesn't compress; store entries as-is.
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let manifest = serde_json::to_vec(&wrapped_keys)
            .map_err(|e| CryptoError::Bundle(e.to_string()))?;
        zip.start_file(KEYS_MANIFEST_NAME, options)
            .map_err(|e| CryptoError::Bundle(e.to_string()))?;
        zip.write_all(&manifest)
            .map_err(|e| CryptoError::Bundle(e.to_string()))?;

        for (name, plaintext) in &self.entries {
            let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
            let nonce = Nonce::from_slice(&nonce_bytes);
            let ciphertext = cipher
                .encrypt(nonce, plaintext.as_slice())
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;

            let mut combined = nonce_bytes.to_vec();
            combined.extend(ciphertext);

            zip.start_file(format!("{ENTRY_PREFIX}{name}"), options)
                .map_err(|e| CryptoError::Bundle(e.to_string()))?;
            zip.write_all(&combined)
                .map_err(|e| CryptoError::Bundle(e.to_string()))?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| CryptoError::Bundle(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::keys::{generate_key_pair, public_key_to_der};

    fn recipient_for(pair: &crate::encryption::RsaKeyPair) -> Recipient {
        let der = public_key_to_der(&pair.public_key).unwrap();
        Recipient {
            fingerprint: fingerprint_public_key_der(&der),
            public_key: der,
        }
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let result = BundleWriter::new(&[]);
        assert!(matches!(result, Err(CryptoError::InvalidRecipients(_))));
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        let bad = Recipient {
            public_key: b"garbage".to_vec(),
            fingerprint: "whatever".into(),
        };
        let result = BundleWriter::new(&[bad]);
        assert!(matches!(result, Err(CryptoError::InvalidRecipients(_))));
    }

    #[test]
    fn bundle_without_entries_is_rejected() {
        let pair = generate_key_pair().unwrap();
        let writer = BundleWriter::new(&[recipient_for(&pair)]).unwrap();
        assert!(matches!(writer.finish(), Err(CryptoError::Bundle(_))));
    }

    #[test]
    fn bundle_is_a_zip_with_manifest_and_entries() {
        let pair = generate_key_pair().unwrap();
        let mut writer = BundleWriter::new(&[recipient_for(&pair)]).unwrap();
        writer.add_entry("error-log.txt", b"it broke");
        let bytes = writer.finish().unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert!(names.iter().any(|n| n == KEYS_MANIFEST_NAME));
        assert!(names.iter().any(|n| n == "entries/error-log.txt"));

        // Entry content must not be the plaintext.
        use std::io::Read;
        let mut entry = archive.by_name("entries/error-log.txt").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_ne!(content, b"it broke");
    }
}

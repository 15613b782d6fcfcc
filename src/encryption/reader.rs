//! Bundle reader: runs wherever the private key lives.
//!
//! The server never calls this with real reviewer keys; it exists so the
//! decrypting client (and our tests) can open bundles produced by
//! `BundleWriter`. Everything here is a pure function of its inputs.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zip::ZipArchive;

use super::keys::fingerprint_from_private_key;
use super::{CryptoError, WrappedContentKey, CONTENT_KEY_SIZE, ENTRY_PREFIX, KEYS_MANIFEST_NAME, NONCE_SIZE};

/// Decrypt a bundle with one recipient's private key, returning every
/// entry as `name → plaintext`.
///
/// Fails with `DecryptionFailed` when the key's fingerprint has no wrap
/// in the bundle, when unwrapping fails, or when any entry fails
/// authenticated decryption. Integrity failures never yield partial
/// plaintext: the whole call errors.
pub fn open_bundle(
    bytes: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<BTreeMap<String, Vec<u8>>, CryptoError> {
    let fingerprint = fingerprint_from_private_key(private_key)?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CryptoError::DecryptionFailed(format!("malformed bundle: {e}")))?;

    let wrapped_keys = read_manifest(&mut archive)?;
    let wrap = wrapped_keys
        .iter()
        .find(|w| w.fingerprint == fingerprint)
        .ok_or_else(|| {
            CryptoError::DecryptionFailed("no wrapped content key matches this private key".into())
        })?;

    let wrapped = BASE64
        .decode(&wrap.key)
        .map_err(|e| CryptoError::DecryptionFailed(format!("malformed wrapped key: {e}")))?;
    let padding = Oaep::new::<Sha256>();
    let content_key = private_key
        .decrypt(padding, &wrapped)
        .map_err(|e| CryptoError::DecryptionFailed(format!("unwrapping content key: {e}")))?;
    if content_key.len() != CONTENT_KEY_SIZE {
        return Err(CryptoError::DecryptionFailed(
            "unwrapped content key has unexpected length".into(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let entry_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(ENTRY_PREFIX))
        .map(String::from)
        .collect();

    let mut entries = BTreeMap::new();
    for full_name in entry_names {
        let mut file = archive
            .by_name(&full_name)
            .map_err(|e| CryptoError::DecryptionFailed(format!("malformed bundle: {e}")))?;
        let mut combined = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut combined)
            .map_err(|e| CryptoError::DecryptionFailed(format!("reading entry: {e}")))?;

        if combined.len() < NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed(format!(
                "entry {full_name} is truncated"
            )));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
            CryptoError::DecryptionFailed(format!("entry {full_name} failed authentication"))
        })?;

        let name = full_name.trim_start_matches(ENTRY_PREFIX).to_string();
        entries.insert(name, plaintext);
    }

    Ok(entries)
}

fn read_manifest(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
) -> Result<Vec<WrappedContentKey>, CryptoError> {
    let mut manifest = archive
        .by_name(KEYS_MANIFEST_NAME)
        .map_err(|_| CryptoError::DecryptionFailed("bundle is missing its key manifest".into()))?;
    let mut raw = Vec::new();
    manifest
        .read_to_end(&mut raw)
        .map_err(|e| CryptoError::DecryptionFailed(format!("reading key manifest: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| CryptoError::DecryptionFailed(format!("malformed key manifest: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::keys::{fingerprint_public_key_der, generate_key_pair, public_key_to_der};
    use crate::encryption::{BundleWriter, Recipient, RsaKeyPair};

    fn recipient_for(pair: &RsaKeyPair) -> Recipient {
        let der = public_key_to_der(&pair.public_key).unwrap();
        Recipient {
            fingerprint: fingerprint_public_key_der(&der),
            public_key: der,
        }
    }

    #[test]
    fn any_recipient_decrypts_all_entries() {
        let alice = generate_key_pair().unwrap();
        let bob = generate_key_pair().unwrap();

        let mut writer =
            BundleWriter::new(&[recipient_for(&alice), recipient_for(&bob)]).unwrap();
        writer.add_entry("results.csv", b"a,b\n1,2\n");
        writer.add_entry("run.log", b"finished in 42s");
        let bundle = writer.finish().unwrap();

        for pair in [&alice, &bob] {
            let entries = open_bundle(&bundle, &pair.private_key).unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries["results.csv"], b"a,b\n1,2\n");
            assert_eq!(entries["run.log"], b"finished in 42s");
        }
    }

    #[test]
    fn unrelated_key_is_rejected() {
        let alice = generate_key_pair().unwrap();
        let mallory = generate_key_pair().unwrap();

        let mut writer = BundleWriter::new(&[recipient_for(&alice)]).unwrap();
        writer.add_entry("secret.txt", b"confidential");
        let bundle = writer.finish().unwrap();

        let result = open_bundle(&bundle, &mallory.private_key);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn tampered_entry_is_rejected() {
        use std::io::Write;
        use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

        let alice = generate_key_pair().unwrap();

        let mut writer = BundleWriter::new(&[recipient_for(&alice)]).unwrap();
        writer.add_entry("data.txt", b"untouched bytes, quite a few of them");
        let bundle = writer.finish().unwrap();

        // Rebuild the archive with one ciphertext byte flipped, leaving
        // the manifest and zip structure intact.
        let mut archive = ZipArchive::new(Cursor::new(bundle.as_slice())).unwrap();
        let mut manifest = Vec::new();
        archive
            .by_name(KEYS_MANIFEST_NAME)
            .unwrap()
            .read_to_end(&mut manifest)
            .unwrap();
        let mut combined = Vec::new();
        archive
            .by_name("entries/data.txt")
            .unwrap()
            .read_to_end(&mut combined)
            .unwrap();
        combined[NONCE_SIZE + 3] ^= 0xff;

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut tampered = ZipWriter::new(Cursor::new(Vec::new()));
        tampered.start_file(KEYS_MANIFEST_NAME, options).unwrap();
        tampered.write_all(&manifest).unwrap();
        tampered.start_file("entries/data.txt", options).unwrap();
        tampered.write_all(&combined).unwrap();
        let tampered_bundle = tampered.finish().unwrap().into_inner();

        let result = open_bundle(&tampered_bundle, &alice.private_key);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let alice = generate_key_pair().unwrap();
        let result = open_bundle(b"definitely not a zip archive", &alice.private_key);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }
}

//! Public-key registry: who may decrypt an org's study artifacts.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::encryption::keys::{fingerprint_public_key_der, public_key_from_der};
use crate::encryption::Recipient;
use crate::models::UserPublicKey;
use crate::store::StudyStore;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("public key is malformed: {0}")]
    InvalidPublicKey(String),

    /// A differing key is already registered and regeneration was not
    /// requested.
    #[error("a different key is already registered for this user")]
    KeyAlreadyRegistered,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Stores public keys per owner with their deterministic fingerprints and
/// resolves the recipient set for an organization.
pub struct KeyFingerprintRegistry {
    store: Arc<dyn StudyStore>,
}

impl KeyFingerprintRegistry {
    pub fn new(store: Arc<dyn StudyStore>) -> Self {
        Self { store }
    }

    /// Register (or, with `regenerate`, replace) the owner's public key.
    ///
    /// The fingerprint is computed here from the SPKI DER bytes; callers
    /// never supply their own. Re-registering the identical key is a
    /// no-op, and a differing key is rejected unless `regenerate` is set.
    ///
    /// Regeneration is irreversible: bundles encrypted for the old key
    /// can no longer be decrypted by this user, and nothing re-encrypts
    /// them.
    pub async fn register_key(
        &self,
        owner_id: Uuid,
        public_key_der: &[u8],
        regenerate: bool,
    ) -> Result<Recipient, RegistryError> {
        // Reject anything that won't parse before it can poison the
        // recipient list of a future bundle.
        public_key_from_der(public_key_der)
            .map_err(|e| RegistryError::InvalidPublicKey(e.to_string()))?;

        let fingerprint = fingerprint_public_key_der(public_key_der);

        if let Some(existing) = self.store.public_key_for_user(owner_id).await? {
            if existing.fingerprint != fingerprint && !regenerate {
                return Err(RegistryError::KeyAlreadyRegistered);
            }
            if existing.fingerprint != fingerprint {
                tracing::info!(
                    user_id = %owner_id,
                    old_fingerprint = %existing.fingerprint,
                    new_fingerprint = %fingerprint,
                    "regenerating user key; bundles for the old key are orphaned"
                );
            }
        }

        self.store
            .upsert_public_key(UserPublicKey {
                user_id: owner_id,
                public_key: public_key_der.to_vec(),
                fingerprint: fingerprint.clone(),
            })
            .await?;

        Ok(Recipient {
            public_key: public_key_der.to_vec(),
            fingerprint,
        })
    }

    /// The owner's registered key, if any. The UI layer reads this to
    /// display key status.
    pub async fn registered_key_for(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<Recipient>, RegistryError> {
        Ok(self
            .store
            .public_key_for_user(owner_id)
            .await?
            .map(|key| Recipient {
                public_key: key.public_key,
                fingerprint: key.fingerprint,
            }))
    }

    /// All org members holding a registered key.
    pub async fn lookup_keys_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<Recipient>, RegistryError> {
        Ok(self
            .store
            .org_public_keys(org_id)
            .await?
            .into_iter()
            .map(|key| Recipient {
                public_key: key.public_key,
                fingerprint: key.fingerprint,
            })
            .collect())
    }
}

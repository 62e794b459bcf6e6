//! Product key exchange.
//!
//! Product keys arrive encrypted under the manufacturer-neutral hardware id.
//! They are decrypted once, then re-encrypted under each user's hardware id,
//! which is itself recovered by decrypting the UPN's encrypted hardware id
//! with the manufacturer key.
//!
//! Plaintext keys and hardware ids live only in [`Zeroizing`] buffers and
//! are never logged.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::cache::ManufacturerKeyCache;
use crate::error::{FieldError, PermitError};
use crate::types::{ProductKey, UserPermit};
use crate::upn::Upn;

/// (cell code, edition) key used to match keys to cells.
pub type KeyId = (String, String);

/// A user with a resolved hardware id.
pub struct UpnInfo {
    /// User title.
    pub title: String,
    /// The user's permit number.
    pub upn: Upn,
    hardware_id: Zeroizing<String>,
}

impl UpnInfo {
    /// Decrypted hardware id.
    #[must_use]
    pub fn hardware_id(&self) -> &str {
        &self.hardware_id
    }
}

impl std::fmt::Debug for UpnInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpnInfo")
            .field("title", &self.title)
            .field("upn", &self.upn)
            .finish_non_exhaustive()
    }
}

/// Product keys re-encrypted for one user.
#[derive(Debug, Clone)]
pub struct UserKeys {
    /// User title.
    pub title: String,
    /// Raw UPN.
    pub upn: String,
    /// Re-encrypted key per (cell code, edition).
    pub keys: HashMap<KeyId, String>,
}

impl UserKeys {
    /// Re-encrypted key for a cell at an edition.
    #[must_use]
    pub fn key_for(&self, cell_code: &str, edition: &str) -> Option<&str> {
        self.keys
            .get(&(cell_code.to_string(), edition.to_string()))
            .map(String::as_str)
    }
}

/// Decrypts product keys and re-encrypts them per user.
pub struct KeyExchange {
    neutral_hardware_id: Zeroizing<String>,
    manufacturer_keys: Arc<ManufacturerKeyCache>,
}

impl KeyExchange {
    /// Create a key exchange.
    pub fn new(
        neutral_hardware_id: impl Into<String>,
        manufacturer_keys: Arc<ManufacturerKeyCache>,
    ) -> Self {
        Self {
            neutral_hardware_id: Zeroizing::new(neutral_hardware_id.into()),
            manufacturer_keys,
        }
    }

    /// Resolve every user's hardware id.
    ///
    /// Manufacturer keys are resolved concurrently; output order matches
    /// input order. Any user whose UPN or manufacturer key cannot be
    /// resolved fails the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Validation`] for an unparseable UPN,
    /// [`PermitError::ManufacturerKeyNotFound`] for an unknown manufacturer,
    /// or a crypto error if decryption fails.
    #[instrument(skip_all, fields(users = user_permits.len()))]
    pub async fn resolve_users(&self, user_permits: &[UserPermit]) -> Result<Vec<UpnInfo>, PermitError> {
        let resolved = join_all(
            user_permits
                .iter()
                .enumerate()
                .map(|(index, p)| self.resolve_user(index, p)),
        )
        .await;
        resolved.into_iter().collect()
    }

    async fn resolve_user(&self, index: usize, permit: &UserPermit) -> Result<UpnInfo, PermitError> {
        let upn = Upn::parse(&permit.upn).map_err(|e| PermitError::Validation {
            errors: vec![FieldError::new(format!("userPermits[{index}].upn"), e.to_string())],
        })?;

        let manufacturer_key = self.manufacturer_keys.get(upn.manufacturer_id()).await?;
        let hardware_id = Zeroizing::new(permit_crypto::decrypt(
            upn.encrypted_hardware_id(),
            &manufacturer_key,
        )?);
        debug!(manufacturer_id = %upn.manufacturer_id(), "Hardware id resolved");

        Ok(UpnInfo {
            title: permit.title.clone(),
            upn,
            hardware_id,
        })
    }

    /// Decrypt product keys under the manufacturer-neutral hardware id.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if any key fails to decrypt.
    pub fn decrypt_product_keys(
        &self,
        product_keys: &[ProductKey],
    ) -> Result<HashMap<KeyId, Zeroizing<String>>, PermitError> {
        product_keys
            .iter()
            .map(|pk| -> Result<(KeyId, Zeroizing<String>), PermitError> {
                let plain = permit_crypto::decrypt(&pk.key, &self.neutral_hardware_id)?;
                Ok((
                    (pk.product_name.clone(), pk.edition.clone()),
                    Zeroizing::new(plain),
                ))
            })
            .collect()
    }

    /// Decrypt product keys and re-encrypt them for every user.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if any decrypt or encrypt fails.
    #[instrument(skip_all, fields(keys = product_keys.len(), users = users.len()))]
    pub fn re_encrypt_keys(
        &self,
        product_keys: &[ProductKey],
        users: &[UpnInfo],
    ) -> Result<Vec<UserKeys>, PermitError> {
        let plaintexts = self.decrypt_product_keys(product_keys)?;

        users
            .iter()
            .map(|user| -> Result<UserKeys, PermitError> {
                let keys = plaintexts
                    .iter()
                    .map(|(id, plain)| -> Result<(KeyId, String), PermitError> {
                        let encrypted = permit_crypto::encrypt(plain, user.hardware_id())?;
                        Ok((id.clone(), encrypted))
                    })
                    .collect::<Result<HashMap<_, _>, _>>()?;
                Ok(UserKeys {
                    title: user.title.clone(),
                    upn: user.upn.to_string(),
                    keys,
                })
            })
            .collect()
    }
}

//! In-memory secret store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::KeyringError;
use crate::store::SecretStore;

/// Secret store held entirely in process memory.
///
/// Values are zeroized when replaced or when the store is dropped.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Zeroizing<String>>>,
    certificates: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a secret.
    pub fn insert_secret(&self, name: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(name.into(), Zeroizing::new(value.into()));
        }
    }

    /// Insert or replace a certificate.
    pub fn insert_certificate(&self, name: impl Into<String>, der: Vec<u8>) {
        if let Ok(mut certs) = self.certificates.write() {
            certs.insert(name.into(), der);
        }
    }

    /// Builder-style secret insertion.
    #[must_use]
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_secret(name, value);
        self
    }

    /// Builder-style certificate insertion.
    #[must_use]
    pub fn with_certificate(self, name: impl Into<String>, der: Vec<u8>) -> Self {
        self.insert_certificate(name, der);
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, KeyringError> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| KeyringError::storage("secret lock poisoned"))?;
        secrets
            .get(name)
            .map(|value| value.as_str().to_string())
            .ok_or_else(|| KeyringError::SecretNotFound {
                name: name.to_string(),
            })
    }

    async fn get_certificate(&self, name: &str) -> Result<Vec<u8>, KeyringError> {
        let certs = self
            .certificates
            .read()
            .map_err(|_| KeyringError::storage("certificate lock poisoned"))?;
        certs
            .get(name)
            .cloned()
            .ok_or_else(|| KeyringError::CertificateNotFound {
                name: name.to_string(),
            })
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, KeyringError> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| KeyringError::storage("secret lock poisoned"))?;
        let mut names: Vec<String> = secrets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_secret() {
        let store = MemorySecretStore::new().with_secret("J0K1L2", "0123456789ABCDEF0123456789ABCDEF");
        assert_eq!(
            store.get_secret("J0K1L2").await.unwrap(),
            "0123456789ABCDEF0123456789ABCDEF"
        );
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let store = MemorySecretStore::new();
        let err = store.get_secret("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_certificate() {
        let store = MemorySecretStore::new().with_certificate("cert", vec![1, 2, 3]);
        assert_eq!(store.get_certificate("cert").await.unwrap(), vec![1, 2, 3]);
        assert!(store.get_certificate("other").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_names_sorted() {
        let store = MemorySecretStore::new()
            .with_secret("b", "2")
            .with_secret("a", "1");
        assert_eq!(store.list_secret_names().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_replace_secret() {
        let store = MemorySecretStore::new().with_secret("k", "old");
        store.insert_secret("k", "new");
        assert_eq!(store.get_secret("k").await.unwrap(), "new");
    }
}

//! JSON-file secret store.
//!
//! Loads secrets and certificates from a JSON document of the form:
//!
//! ```json
//! {
//!   "secrets": { "J0K1L2": "0123456789ABCDEF0123456789ABCDEF" },
//!   "certificates": { "permit-signing-cert": "<base64 DER>" }
//! }
//! ```
//!
//! The file is read once at open time and can be re-read with
//! [`FileSecretStore::reload`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::KeyringError;
use crate::memory::MemorySecretStore;
use crate::store::SecretStore;

/// On-disk layout of a secret file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretFile {
    /// Secret name to value.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    /// Certificate name to Base64-encoded bytes.
    #[serde(default)]
    pub certificates: HashMap<String, String>,
}

/// Secret store backed by a JSON file.
pub struct FileSecretStore {
    path: PathBuf,
    inner: MemorySecretStore,
}

impl FileSecretStore {
    /// Open and load a secret file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or a certificate
    /// is not valid Base64.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, KeyringError> {
        let path = path.as_ref().to_path_buf();
        let inner = Self::load(&path).await?;
        Ok(Self { path, inner })
    }

    /// Re-read the backing file, replacing the loaded contents.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub async fn reload(&mut self) -> Result<(), KeyringError> {
        self.inner = Self::load(&self.path).await?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> Result<MemorySecretStore, KeyringError> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            KeyringError::storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        let file: SecretFile = serde_json::from_slice(&raw)?;

        let store = MemorySecretStore::new();
        for (name, value) in file.secrets {
            store.insert_secret(name, value);
        }
        for (name, encoded) in file.certificates {
            let der = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| KeyringError::InvalidSecret {
                    name: name.clone(),
                    reason: format!("certificate is not base64: {e}"),
                })?;
            debug!(name = %name, len = der.len(), "FileSecretStore: loaded certificate");
            store.insert_certificate(name, der);
        }

        info!(path = %path.display(), "FileSecretStore: loaded secret file");
        Ok(store)
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, KeyringError> {
        self.inner.get_secret(name).await
    }

    async fn get_certificate(&self, name: &str) -> Result<Vec<u8>, KeyringError> {
        self.inner.get_certificate(name).await
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, KeyringError> {
        self.inner.list_secret_names().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_open_and_read() {
        let file = write_file(
            r#"{
                "secrets": { "J0K1L2": "00112233445566778899AABBCCDDEEFF" },
                "certificates": { "cert": "AQID" }
            }"#,
        );
        let store = FileSecretStore::open(file.path()).await.unwrap();

        assert_eq!(
            store.get_secret("J0K1L2").await.unwrap(),
            "00112233445566778899AABBCCDDEEFF"
        );
        assert_eq!(store.get_certificate("cert").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.list_secret_names().await.unwrap(), vec!["J0K1L2"]);
    }

    #[tokio::test]
    async fn test_missing_sections_default_empty() {
        let file = write_file("{}");
        let store = FileSecretStore::open(file.path()).await.unwrap();
        assert!(store.list_secret_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_certificate_rejected() {
        let file = write_file(r#"{ "certificates": { "cert": "***" } }"#);
        let err = FileSecretStore::open(file.path()).await.err().unwrap();
        assert!(matches!(err, KeyringError::InvalidSecret { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = FileSecretStore::open("/nonexistent/secrets.json")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::StorageFailed { .. }));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let mut file = write_file(r#"{ "secrets": { "a": "1" } }"#);
        let mut store = FileSecretStore::open(file.path()).await.unwrap();

        file.as_file_mut().set_len(0).unwrap();
        std::fs::write(file.path(), r#"{ "secrets": { "b": "2" } }"#).unwrap();
        store.reload().await.unwrap();

        assert!(store.get_secret("a").await.unwrap_err().is_not_found());
        assert_eq!(store.get_secret("b").await.unwrap(), "2");
    }
}

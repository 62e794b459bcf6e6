//! Secret-store trait.
//!
//! This module defines the [`SecretStore`] contract the permit pipeline
//! consumes: given a name, return a secret value or certificate.

use async_trait::async_trait;

use crate::error::KeyringError;

/// Read access to named secrets and certificates.
///
/// ## Contract
///
/// - `get_secret` returns the secret value as stored (manufacturer keys are
///   32 hex characters, signing keys are Base64 DER)
/// - `get_certificate` returns raw certificate bytes
/// - `list_secret_names` enumerates every secret name, used to bulk-prime the
///   manufacturer-key cache at startup
///
/// Implementations must never log secret values.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a secret value by name.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::SecretNotFound`] if no secret has this name.
    async fn get_secret(&self, name: &str) -> Result<String, KeyringError>;

    /// Get certificate bytes by name.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::CertificateNotFound`] if no certificate has this name.
    async fn get_certificate(&self, name: &str) -> Result<Vec<u8>, KeyringError>;

    /// List every secret name in the store.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be enumerated.
    async fn list_secret_names(&self) -> Result<Vec<String>, KeyringError>;
}

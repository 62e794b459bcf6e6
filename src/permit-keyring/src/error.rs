//! Error types for secret-store operations.

use thiserror::Error;

/// Errors that can occur during secret-store operations.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// Secret with the specified name not found.
    #[error("Secret not found: {name}")]
    SecretNotFound {
        /// The secret name that was not found.
        name: String,
    },

    /// Certificate with the specified name not found.
    #[error("Certificate not found: {name}")]
    CertificateNotFound {
        /// The certificate name that was not found.
        name: String,
    },

    /// Stored secret is present but unusable.
    #[error("Invalid secret {name}: {reason}")]
    InvalidSecret {
        /// The secret name.
        name: String,
        /// Reason the secret is invalid.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Storage operation failed.
    #[error("Storage failed: {reason}")]
    StorageFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Backend-specific error.
    #[error("Secret backend error: {message}")]
    BackendError {
        /// Error message from the backend.
        message: String,
    },
}

impl KeyringError {
    /// Create a backend error from a message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Create a storage error from a reason.
    #[must_use]
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::StorageFailed {
            reason: reason.into(),
        }
    }

    /// Whether the error means the named item does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SecretNotFound { .. } | Self::CertificateNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Input text or key is not exactly one hex-encoded AES block.
    #[error("Invalid {field} length: expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Which input was rejected (`text` or `key`).
        field: &'static str,
        /// Required length in characters.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Input is the right length but not valid hex.
    #[error("Invalid hex in {field}")]
    InvalidHex {
        /// Which input was rejected.
        field: &'static str,
    },

    /// The block cipher rejected the operation.
    #[error("Cipher operation failed: {reason}")]
    CipherFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Invalid signature format or length.
    #[error("Invalid signature: {reason}")]
    InvalidSignature {
        /// Reason the signature is invalid.
        reason: String,
    },

    /// Invalid public key format or length.
    #[error("Invalid public key: {reason}")]
    InvalidPublicKey {
        /// Reason the key is invalid.
        reason: String,
    },

    /// Invalid private key format or length.
    #[error("Invalid private key: {reason}")]
    InvalidPrivateKey {
        /// Reason the key is invalid.
        reason: String,
    },

    /// Digest has the wrong size for the signature algorithm.
    #[error("Invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigest {
        /// Required digest length.
        expected: usize,
        /// Supplied digest length.
        actual: usize,
    },

    /// Signing operation failed.
    #[error("Signing failed: {reason}")]
    SigningFailed {
        /// Reason for the failure.
        reason: String,
    },
}

impl CryptoError {
    /// Create an invalid signature error.
    #[must_use]
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }

    /// Create an invalid public key error.
    #[must_use]
    pub fn invalid_public_key(reason: impl Into<String>) -> Self {
        Self::InvalidPublicKey {
            reason: reason.into(),
        }
    }

    /// Create an invalid private key error.
    #[must_use]
    pub fn invalid_private_key(reason: impl Into<String>) -> Self {
        Self::InvalidPrivateKey {
            reason: reason.into(),
        }
    }

    /// Create a signing failed error.
    #[must_use]
    pub fn signing_failed(reason: impl Into<String>) -> Self {
        Self::SigningFailed {
            reason: reason.into(),
        }
    }

    /// Whether this error came from a wrong-length cipher input.
    #[must_use]
    pub fn is_length_error(&self) -> bool {
        matches!(self, Self::InvalidLength { .. })
    }
}

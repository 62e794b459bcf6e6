//! Signer and verifier traits for permit signatures.
//!
//! Permit signatures are computed over a precomputed digest rather than the
//! raw document: the caller hashes the validated XML once and signs the hash.

use crate::error::CryptoError;

/// Trait for signing a precomputed digest.
pub trait DigestSigner {
    /// Get the public key (uncompressed SEC1).
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign a digest and return the fixed-size `r || s` signature.
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Trait for verifying a signature over a precomputed digest.
pub trait DigestVerifier {
    /// Verify a signature against a public key.
    fn verify_digest(
        &self,
        public_key: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError>;
}

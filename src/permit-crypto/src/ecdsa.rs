//! ECDSA P-384 signature operations.
//!
//! Permit signatures are ECDSA P-384 over a SHA-384 digest. Private keys
//! arrive from the secret store as Base64-encoded DER: SEC1 `ECPrivateKey`
//! or PKCS#8 `PrivateKeyInfo`. A bare 48-byte scalar is also accepted.

use base64::Engine;
use p384::ecdsa::{
    signature::hazmat::{PrehashSigner, PrehashVerifier},
    Signature, SigningKey, VerifyingKey,
};
use p384::elliptic_curve::rand_core::OsRng;
use p384::pkcs8::DecodePrivateKey;
use p384::SecretKey;
use zeroize::Zeroizing;

use crate::digest::SHA384_LEN;
use crate::error::CryptoError;
use crate::signer::{DigestSigner, DigestVerifier};

/// ECDSA P-384 signer.
pub struct P384Signer {
    signing_key: SigningKey,
}

impl P384Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Import a signer from a Base64-encoded EC private key blob.
    ///
    /// # Errors
    ///
    /// Returns error if the Base64 or DER is malformed, or the key is not
    /// on P-384.
    pub fn from_base64(private_key_b64: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(private_key_b64.trim())
                .map_err(|e| CryptoError::invalid_private_key(format!("bad base64: {e}")))?,
        );
        Self::from_der(&der)
    }

    /// Import a signer from DER bytes (SEC1, PKCS#8 or a raw scalar).
    ///
    /// # Errors
    ///
    /// Returns error if no supported encoding matches.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(secret) = SecretKey::from_sec1_der(der) {
            return Ok(Self {
                signing_key: SigningKey::from(&secret),
            });
        }
        if let Ok(signing_key) = SigningKey::from_pkcs8_der(der) {
            return Ok(Self { signing_key });
        }
        let signing_key = SigningKey::from_slice(der).map_err(|_| {
            CryptoError::invalid_private_key("not a SEC1, PKCS#8 or raw P-384 key")
        })?;
        Ok(Self { signing_key })
    }

    /// Export the private key as Base64 SEC1 DER.
    ///
    /// # Errors
    ///
    /// Returns error if DER encoding fails.
    pub fn to_base64(&self) -> Result<Zeroizing<String>, CryptoError> {
        let secret = SecretKey::from(&self.signing_key);
        let der = secret
            .to_sec1_der()
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;
        Ok(Zeroizing::new(
            base64::engine::general_purpose::STANDARD.encode(der.as_slice()),
        ))
    }

    /// Get the verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign a digest and return the signature as Base64.
    ///
    /// # Errors
    ///
    /// Returns error if the digest has the wrong length or signing fails.
    pub fn sign_digest_base64(&self, digest: &[u8]) -> Result<String, CryptoError> {
        let signature = self.sign_digest(digest)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}

impl DigestSigner for P384Signer {
    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let encoded = self.signing_key.verifying_key().to_encoded_point(false); // Uncompressed
        Ok(encoded.as_bytes().to_vec())
    }

    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_digest(digest)?;
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::signing_failed(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA P-384 verifier.
pub struct P384Verifier;

impl P384Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for P384Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestVerifier for P384Verifier {
    fn verify_digest(
        &self,
        public_key: &[u8],
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        check_digest(digest)?;

        let vk = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

        let sig = Signature::from_slice(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        match vk.verify_prehash(digest, &sig) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

fn check_digest(digest: &[u8]) -> Result<(), CryptoError> {
    if digest.len() != SHA384_LEN {
        return Err(CryptoError::InvalidDigest {
            expected: SHA384_LEN,
            actual: digest.len(),
        });
    }
    Ok(())
}

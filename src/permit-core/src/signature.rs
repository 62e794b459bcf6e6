//! Permit signing.
//!
//! The validated permit XML is hashed with SHA-384 and the digest is signed
//! with ECDSA P-384 using a Base64 EC private key held in the secret store.
//! The result is wrapped in a standalone signature document that names the
//! permit file and the signing certificate.

use std::sync::Arc;

use base64::Engine;
use permit_crypto::{DigestSigner, DigestVerifier, P384Signer, P384Verifier, SHA384_LEN};
use permit_keyring::SecretStore;
use tracing::{info, instrument};

use crate::error::PermitError;

/// Detached signature for one permit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDocument {
    /// Name of the signed file.
    pub filename: String,
    /// Certificate id.
    pub certificate_id: String,
    /// Certificate bytes.
    pub certificate: Vec<u8>,
    /// Signature id.
    pub signature_id: String,
    /// Base64 `r || s` signature.
    pub signature: String,
}

impl SignatureDocument {
    /// Certificate as Base64.
    #[must_use]
    pub fn certificate_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.certificate)
    }
}

/// Signs permits with a key from the secret store.
pub struct SignatureProvider {
    store: Arc<dyn SecretStore>,
    signing_key_name: String,
    certificate_name: String,
    certificate_id: String,
}

impl SignatureProvider {
    /// Create a provider reading the key and certificate under the given names.
    pub fn new(
        store: Arc<dyn SecretStore>,
        signing_key_name: impl Into<String>,
        certificate_name: impl Into<String>,
        certificate_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            signing_key_name: signing_key_name.into(),
            certificate_name: certificate_name.into(),
            certificate_id: certificate_id.into(),
        }
    }

    /// SHA-384 digest of the XML's UTF-8 bytes.
    #[must_use]
    pub fn hash(xml: &str) -> [u8; SHA384_LEN] {
        permit_crypto::sha384(xml.as_bytes())
    }

    /// Sign a digest with a Base64 EC private key, returning a Base64 signature.
    ///
    /// # Errors
    ///
    /// Returns a crypto error for a malformed key or digest.
    pub fn sign(digest: &[u8], private_key_b64: &str) -> Result<String, PermitError> {
        let signer = P384Signer::from_base64(private_key_b64)?;
        Ok(signer.sign_digest_base64(digest)?)
    }

    /// Verify a Base64 signature over `xml` against an uncompressed SEC1
    /// public key.
    ///
    /// # Errors
    ///
    /// Returns a crypto error for a malformed key or signature encoding.
    pub fn verify(xml: &str, signature_b64: &str, public_key: &[u8]) -> Result<bool, PermitError> {
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| permit_crypto::CryptoError::invalid_signature(format!("bad base64: {e}")))?;
        Ok(P384Verifier::new().verify_digest(public_key, &Self::hash(xml), &signature)?)
    }

    /// Public key of the configured signing key, uncompressed SEC1.
    ///
    /// # Errors
    ///
    /// Returns error if the key is missing or malformed.
    pub async fn public_key(&self) -> Result<Vec<u8>, PermitError> {
        let key = zeroize::Zeroizing::new(self.store.get_secret(&self.signing_key_name).await?);
        Ok(P384Signer::from_base64(&key)?.public_key()?)
    }

    /// Hash and sign a permit, producing its signature document.
    ///
    /// # Errors
    ///
    /// Returns error if the key or certificate cannot be loaded, or signing
    /// fails. No partial document is produced.
    #[instrument(skip(self, xml), fields(len = xml.len()))]
    pub async fn sign_permit(&self, filename: &str, xml: &str) -> Result<SignatureDocument, PermitError> {
        let key = zeroize::Zeroizing::new(self.store.get_secret(&self.signing_key_name).await?);
        let certificate = self.store.get_certificate(&self.certificate_name).await?;

        let digest = Self::hash(xml);
        let signature = Self::sign(&digest, &key)?;
        info!(certificate_id = %self.certificate_id, "Permit signed");

        Ok(SignatureDocument {
            filename: filename.to_string(),
            certificate_id: self.certificate_id.clone(),
            certificate,
            signature_id: signature_id(filename),
            signature,
        })
    }
}

/// Extract the Base64 signature value from a signature document.
///
/// # Errors
///
/// Returns [`PermitError::Serialization`] if the document cannot be parsed
/// or has no `digitalSignature` element.
pub fn read_signature_value(signature_xml: &str) -> Result<String, PermitError> {
    let doc = roxmltree::Document::parse(signature_xml)
        .map_err(|e| PermitError::serialization(format!("signature document: {e}")))?;
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "digitalSignature")
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| PermitError::serialization("signature document has no digitalSignature"))
}

fn signature_id(filename: &str) -> String {
    filename
        .split('.')
        .next()
        .unwrap_or(filename)
        .to_ascii_lowercase()
}

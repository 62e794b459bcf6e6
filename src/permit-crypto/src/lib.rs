//! # permit-crypto
//!
//! Cryptographic primitives for S-100 permit generation.
//!
//! This crate implements the two cryptographic concerns of the permit pipeline:
//! - **Key exchange**: fixed-parameter AES-128 (CBC, zero IV, no padding) over
//!   single 128-bit blocks carried as 32-character hex strings
//! - **Permit signing**: SHA-384 digest of the permit XML, signed with ECDSA P-384
//!
//! ## Key Exchange
//!
//! ```text
//! product_key  = Decrypt(pks_key, neutral_hardware_id)
//! hardware_id  = Decrypt(upn.encrypted_hardware_id, manufacturer_key)
//! permit_key   = Encrypt(product_key, hardware_id)
//! ```
//!
//! The cipher is deterministic: the same `(text, key)` pair always yields the
//! same output. Nothing in this crate logs key material.
//!
//! ## Signing
//!
//! ```rust,ignore
//! let signer = P384Signer::from_base64(&private_key_b64)?;
//! let digest = sha384(xml.as_bytes());
//! let signature = signer.sign_digest(&digest)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cipher;
mod digest;
mod ecdsa;
mod error;
mod signer;

pub use cipher::{decrypt, encrypt, BLOCK_HEX_LEN};
pub use digest::{sha384, SHA384_LEN};
pub use ecdsa::{P384Signer, P384Verifier};
pub use error::CryptoError;
pub use signer::{DigestSigner, DigestVerifier};

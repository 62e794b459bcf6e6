//! # permit-keyring
//!
//! Secret storage for the permit service.
//!
//! The permit pipeline needs three kinds of secret material:
//! - **Manufacturer keys**: one 32-hex-character AES key per manufacturer id,
//!   stored under the manufacturer id as the secret name
//! - **Signing key**: the Base64 EC private key used to sign permits
//! - **Certificate**: the certificate referenced by the signature document
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemorySecretStore`] | Tests and embedding callers that already hold secrets |
//! | [`FileSecretStore`] | JSON file on disk, for local runs of `permit-gen` |
//!
//! A vault-backed store implements [`SecretStore`] outside this workspace.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use permit_keyring::{FileSecretStore, SecretStore};
//!
//! let store = FileSecretStore::open("secrets.json").await?;
//! let key = store.get_secret("J0K1L2").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

mod error;
mod file;
mod memory;
mod store;

pub use error::KeyringError;
pub use file::{FileSecretStore, SecretFile};
pub use memory::MemorySecretStore;
pub use store::SecretStore;

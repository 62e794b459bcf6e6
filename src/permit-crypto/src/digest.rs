//! SHA-384 digest used for permit signatures.

use sha2::{Digest, Sha384};

/// Size of a SHA-384 digest in bytes.
pub const SHA384_LEN: usize = 48;

/// Hash content with SHA-384.
#[must_use]
pub fn sha384(content: &[u8]) -> [u8; SHA384_LEN] {
    let mut hasher = Sha384::new();
    hasher.update(content);
    hasher.finalize().into()
}

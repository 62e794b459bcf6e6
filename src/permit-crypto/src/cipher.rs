//! Single-block AES-128 cipher over hex strings.
//!
//! Fixed parameters: AES-128, CBC, all-zero IV, no padding. Every input is
//! exactly one 16-byte block, so CBC over one block with a zero IV is the
//! raw block transform. Output is uppercase hex with no separators.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Length of one hex-encoded AES block (and of a hex-encoded AES-128 key).
pub const BLOCK_HEX_LEN: usize = 32;

const BLOCK_LEN: usize = 16;
const ZERO_IV: [u8; BLOCK_LEN] = [0u8; BLOCK_LEN];

/// Decrypt one hex-encoded block under a hex-encoded AES-128 key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidLength`] if either argument is not exactly
/// 32 characters; the cipher is not attempted in that case.
pub fn decrypt(cipher_hex: &str, key_hex: &str) -> Result<String, CryptoError> {
    let (mut block, key) = decode_inputs(cipher_hex, key_hex)?;

    let plain = Aes128CbcDec::new_from_slices(key.as_slice(), &ZERO_IV)
        .map_err(|e| CryptoError::CipherFailed {
            reason: e.to_string(),
        })?
        .decrypt_padded_mut::<NoPadding>(block.as_mut_slice())
        .map_err(|e| CryptoError::CipherFailed {
            reason: e.to_string(),
        })?;

    Ok(hex::encode_upper(plain))
}

/// Encrypt one hex-encoded block under a hex-encoded AES-128 key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidLength`] if either argument is not exactly
/// 32 characters; the cipher is not attempted in that case.
pub fn encrypt(plain_hex: &str, key_hex: &str) -> Result<String, CryptoError> {
    let (mut block, key) = decode_inputs(plain_hex, key_hex)?;

    let cipher = Aes128CbcEnc::new_from_slices(key.as_slice(), &ZERO_IV)
        .map_err(|e| CryptoError::CipherFailed {
            reason: e.to_string(),
        })?
        .encrypt_padded_mut::<NoPadding>(block.as_mut_slice(), BLOCK_LEN)
        .map_err(|e| CryptoError::CipherFailed {
            reason: e.to_string(),
        })?;

    Ok(hex::encode_upper(cipher))
}

/// Length-check both inputs, then hex-decode them.
fn decode_inputs(
    text_hex: &str,
    key_hex: &str,
) -> Result<(Zeroizing<[u8; BLOCK_LEN]>, Zeroizing<[u8; BLOCK_LEN]>), CryptoError> {
    check_length("text", text_hex)?;
    check_length("key", key_hex)?;

    let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
    hex::decode_to_slice(text_hex, block.as_mut_slice())
        .map_err(|_| CryptoError::InvalidHex { field: "text" })?;

    let mut key = Zeroizing::new([0u8; BLOCK_LEN]);
    hex::decode_to_slice(key_hex, key.as_mut_slice())
        .map_err(|_| CryptoError::InvalidHex { field: "key" })?;

    Ok((block, key))
}

fn check_length(field: &'static str, value: &str) -> Result<(), CryptoError> {
    if value.len() != BLOCK_HEX_LEN {
        return Err(CryptoError::InvalidLength {
            field,
            expected: BLOCK_HEX_LEN,
            actual: value.len(),
        });
    }
    Ok(())
}

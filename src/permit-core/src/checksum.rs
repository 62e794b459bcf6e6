//! CRC-32 checksum embedded in user permit numbers.
//!
//! A UPN is `encryptedHardwareId(32) | checksum(8) | manufacturerId(6)`. The
//! checksum is the CRC-32 of the encrypted hardware id's UTF-8 bytes,
//! formatted as eight uppercase hex digits.

use crate::upn::{CHECKSUM_LEN, HARDWARE_ID_LEN};

/// Compute the checksum for an encrypted hardware id.
#[must_use]
pub fn compute_checksum(encrypted_hardware_id: &str) -> String {
    format!("{:08X}", crc32fast::hash(encrypted_hardware_id.as_bytes()))
}

/// Whether the checksum embedded in `upn` matches its encrypted hardware id.
///
/// Returns `false` for strings too short to carry a checksum.
#[must_use]
pub fn is_valid_checksum(upn: &str) -> bool {
    let (Some(hardware_id), Some(checksum)) = (
        upn.get(..HARDWARE_ID_LEN),
        upn.get(HARDWARE_ID_LEN..HARDWARE_ID_LEN + CHECKSUM_LEN),
    ) else {
        return false;
    };
    compute_checksum(hardware_id) == checksum
}

//! User permit number (UPN) parsing.

use std::fmt;

use thiserror::Error;

use crate::checksum::{compute_checksum, is_valid_checksum};

/// Total UPN length.
pub const UPN_LEN: usize = 46;
/// Length of the encrypted hardware id prefix.
pub const HARDWARE_ID_LEN: usize = 32;
/// Length of the checksum.
pub const CHECKSUM_LEN: usize = 8;
/// Length of the trailing manufacturer id.
pub const MANUFACTURER_ID_LEN: usize = 6;

/// Reasons a UPN is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpnError {
    /// Wrong length.
    #[error("UPN must be 46 characters, got {actual}")]
    Length {
        /// Length received.
        actual: usize,
    },

    /// Contains characters outside `[0-9A-Za-z]`.
    #[error("UPN must contain only alphanumeric characters")]
    InvalidCharacters,

    /// Checksum does not match the encrypted hardware id.
    #[error("UPN checksum is invalid")]
    Checksum,
}

/// A length- and checksum-validated user permit number.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Upn {
    raw: String,
}

impl Upn {
    /// Parse and validate a UPN.
    ///
    /// # Errors
    ///
    /// Returns [`UpnError`] on wrong length, non-alphanumeric characters or a
    /// checksum mismatch.
    pub fn parse(raw: &str) -> Result<Self, UpnError> {
        let actual = raw.chars().count();
        if actual != UPN_LEN {
            return Err(UpnError::Length { actual });
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(UpnError::InvalidCharacters);
        }
        if !is_valid_checksum(raw) {
            return Err(UpnError::Checksum);
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// Build a UPN from an encrypted hardware id and manufacturer id,
    /// computing the checksum.
    ///
    /// # Errors
    ///
    /// Returns [`UpnError`] if either part has the wrong length or characters.
    pub fn compose(encrypted_hardware_id: &str, manufacturer_id: &str) -> Result<Self, UpnError> {
        let raw = format!(
            "{}{}{}",
            encrypted_hardware_id,
            compute_checksum(encrypted_hardware_id),
            manufacturer_id
        );
        Self::parse(&raw)
    }

    /// The full 46-character string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The 32-character encrypted hardware id.
    #[must_use]
    pub fn encrypted_hardware_id(&self) -> &str {
        &self.raw[..HARDWARE_ID_LEN]
    }

    /// The 8-character checksum.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.raw[HARDWARE_ID_LEN..HARDWARE_ID_LEN + CHECKSUM_LEN]
    }

    /// The 6-character manufacturer id.
    #[must_use]
    pub fn manufacturer_id(&self) -> &str {
        &self.raw[HARDWARE_ID_LEN + CHECKSUM_LEN..]
    }
}

impl fmt::Display for Upn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Upn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upn")
            .field("manufacturer_id", &self.manufacturer_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPN: &str = "EF1C61C926BD9F18F44897CA1A5214BE06F92FF8J0K1L2";

    #[test]
    fn test_parse_parts() {
        let upn = Upn::parse(UPN).unwrap();
        assert_eq!(upn.encrypted_hardware_id(), "EF1C61C926BD9F18F44897CA1A5214BE");
        assert_eq!(upn.checksum(), "06F92FF8");
        assert_eq!(upn.manufacturer_id(), "J0K1L2");
        assert_eq!(upn.to_string(), UPN);
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            Upn::parse(&UPN[..45]).unwrap_err(),
            UpnError::Length { actual: 45 }
        );
        assert!(Upn::parse(&UPN[..45])
            .unwrap_err()
            .to_string()
            .contains("must be 46 characters"));
    }

    #[test]
    fn test_parse_bad_characters() {
        let bad = format!("{}-", &UPN[..45]);
        assert_eq!(Upn::parse(&bad).unwrap_err(), UpnError::InvalidCharacters);
    }

    #[test]
    fn test_parse_bad_checksum() {
        let bad = format!("{}00000000{}", &UPN[..32], &UPN[40..]);
        assert_eq!(Upn::parse(&bad).unwrap_err(), UpnError::Checksum);
    }

    #[test]
    fn test_compose_matches_parse() {
        let upn = Upn::compose("EF1C61C926BD9F18F44897CA1A5214BE", "J0K1L2").unwrap();
        assert_eq!(upn.as_str(), UPN);
    }

    #[test]
    fn test_debug_omits_hardware_id() {
        let upn = Upn::parse(UPN).unwrap();
        assert!(!format!("{upn:?}").contains("EF1C61C9"));
    }
}

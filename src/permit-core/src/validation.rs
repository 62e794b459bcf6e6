//! Request and user-permit validation.
//!
//! Validation collects every violation instead of stopping at the first.
//! Each product and each user permit is checked independently and errors are
//! keyed by collection index and field name, e.g. `userPermits[1].upn`.
//!
//! ## Date rules
//!
//! Product expiry dates must be `YYYY-MM-DD`. Three failures are reported
//! with distinct messages:
//!
//! - wrong shape (`2026/01/31`, `31-01-2026`)
//! - right shape but not a calendar date (`2026-02-30`)
//! - a real date before today, unless past expiries are allowed

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, PermitError};
use crate::types::UserPermit;
use crate::upn::{Upn, UpnError};

/// Expected expiry date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Batch request to generate permits for explicit products and users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRequest {
    /// Products (cells) to issue permits for.
    #[serde(default)]
    pub products: Vec<ProductRequest>,

    /// Users to issue permits to.
    #[serde(default)]
    pub user_permits: Vec<UserPermit>,
}

/// One requested product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    /// Cell code, e.g. `101GB004`.
    #[serde(default)]
    pub product_name: String,

    /// Edition number, at least 1.
    #[serde(default)]
    pub edition_number: i64,

    /// Permit expiry date, `YYYY-MM-DD`.
    #[serde(default)]
    pub permit_expiry_date: String,
}

/// Validator for incoming permit requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator {
    allow_past_expiry: bool,
}

impl RequestValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(allow_past_expiry: bool) -> Self {
        Self { allow_past_expiry }
    }

    /// Validate a whole request against `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Validation`] carrying every violation found.
    pub fn validate(&self, request: &PermitRequest, today: NaiveDate) -> Result<(), PermitError> {
        let mut errors = self.validate_products(&request.products, today);
        errors.extend(validate_user_permits(&request.user_permits));
        into_result(errors)
    }

    /// Validate the product list, returning every violation.
    #[must_use]
    pub fn validate_products(&self, products: &[ProductRequest], today: NaiveDate) -> Vec<FieldError> {
        if products.is_empty() {
            return vec![FieldError::new(
                "products",
                "Products collection cannot be empty",
            )];
        }

        let mut errors = Vec::new();
        for (i, product) in products.iter().enumerate() {
            if product.product_name.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("products[{i}].productName"),
                    "Product name cannot be empty",
                ));
            }

            if product.edition_number < 1 {
                errors.push(FieldError::new(
                    format!("products[{i}].editionNumber"),
                    "Edition number must be at least 1",
                ));
            }

            let field = format!("products[{i}].permitExpiryDate");
            match parse_expiry(&product.permit_expiry_date) {
                Err(message) => errors.push(FieldError::new(field, message)),
                Ok(date) if date < today && !self.allow_past_expiry => errors.push(
                    FieldError::new(field, "Permit expiry date cannot be in the past"),
                ),
                Ok(_) => {},
            }
        }
        errors
    }
}

/// Validate user permits, returning every violation.
///
/// Titles must be non-empty and UPNs must be 46 alphanumeric characters with
/// a valid checksum.
#[must_use]
pub fn validate_user_permits(user_permits: &[UserPermit]) -> Vec<FieldError> {
    if user_permits.is_empty() {
        return vec![FieldError::new(
            "userPermits",
            "User permits collection cannot be empty",
        )];
    }

    let mut errors = Vec::new();
    for (i, permit) in user_permits.iter().enumerate() {
        if permit.title.trim().is_empty() {
            errors.push(FieldError::new(
                format!("userPermits[{i}].title"),
                "Title cannot be empty",
            ));
        }

        let field = format!("userPermits[{i}].upn");
        if permit.upn.is_empty() {
            errors.push(FieldError::new(field, "UPN cannot be empty"));
            continue;
        }
        match Upn::parse(&permit.upn) {
            Ok(_) => {},
            Err(UpnError::Length { .. }) => {
                errors.push(FieldError::new(field, "UPN must be 46 characters"));
            },
            Err(e) => errors.push(FieldError::new(field, e.to_string())),
        }
    }
    errors
}

/// Turn collected violations into a result.
///
/// # Errors
///
/// Returns [`PermitError::Validation`] if `errors` is non-empty.
pub fn into_result(errors: Vec<FieldError>) -> Result<(), PermitError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PermitError::Validation { errors })
    }
}

/// Parse a `YYYY-MM-DD` expiry date, distinguishing malformed from
/// impossible dates.
fn parse_expiry(raw: &str) -> Result<NaiveDate, &'static str> {
    if raw.trim().is_empty() {
        return Err("Permit expiry date cannot be empty");
    }
    if !has_date_shape(raw) {
        return Err("Permit expiry date must be in YYYY-MM-DD format");
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| "Permit expiry date is not a valid calendar date")
}

fn has_date_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

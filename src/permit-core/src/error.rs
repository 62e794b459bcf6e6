//! Error types for the permit pipeline.
//!
//! Every failure carries a stable [`ErrorCode`], a message template (the
//! `#[error]` string) and its arguments as named fields. Callers log the
//! fields and translate the error into an [`ErrorResponse`] with
//! [`PermitError::to_response`].

use std::fmt;

use permit_crypto::CryptoError;
use permit_keyring::KeyringError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ErrorDetail, ErrorResponse};

/// Upstream service that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpstreamService {
    /// Licence holdings service.
    Holdings,
    /// User permit (UPN) service.
    UserPermitService,
    /// Product key service.
    ProductKeyService,
    /// OAuth token endpoint.
    TokenService,
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Holdings => "Holdings",
            Self::UserPermitService => "UserPermitService",
            Self::ProductKeyService => "ProductKeyService",
            Self::TokenService => "TokenService",
        };
        f.write_str(name)
    }
}

/// One itemized validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending field, e.g. `userPermits[0].upn`.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Stable identifying code for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Request or upstream payload failed validation.
    RequestValidation = 1001,
    /// Upstream returned 400/404 with a structured body.
    UpstreamDomainFailure = 2001,
    /// Upstream returned an unexpected status.
    UpstreamFailure = 2002,
    /// Upstream stayed unavailable through every retry.
    UpstreamRetriesExhausted = 2003,
    /// Upstream could not be reached.
    UpstreamTransport = 2004,
    /// Upstream body could not be parsed.
    UpstreamInvalidResponse = 2005,
    /// Bearer token could not be obtained.
    TokenAcquisition = 2006,
    /// No manufacturer key for a UPN's manufacturer id.
    ManufacturerKeyNotFound = 3001,
    /// Key service returned no key for a held cell.
    ProductKeyMissing = 3002,
    /// Cipher, digest or signature failure.
    Crypto = 3003,
    /// Secret store failure.
    SecretStore = 3004,
    /// Permit XML failed schema validation.
    InvalidSchema = 4001,
    /// Schema file could not be loaded.
    SchemaLoad = 4002,
    /// Permit could not be serialized.
    Serialization = 4003,
    /// Signed permits could not be written out.
    Packaging = 4004,
    /// Invalid configuration.
    Configuration = 5001,
    /// Caller cancelled the operation.
    Cancelled = 5002,
}

impl ErrorCode {
    /// Numeric code.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Code name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestValidation => "RequestValidation",
            Self::UpstreamDomainFailure => "UpstreamDomainFailure",
            Self::UpstreamFailure => "UpstreamFailure",
            Self::UpstreamRetriesExhausted => "UpstreamRetriesExhausted",
            Self::UpstreamTransport => "UpstreamTransport",
            Self::UpstreamInvalidResponse => "UpstreamInvalidResponse",
            Self::TokenAcquisition => "TokenAcquisition",
            Self::ManufacturerKeyNotFound => "ManufacturerKeyNotFound",
            Self::ProductKeyMissing => "ProductKeyMissing",
            Self::Crypto => "Crypto",
            Self::SecretStore => "SecretStore",
            Self::InvalidSchema => "InvalidSchema",
            Self::SchemaLoad => "SchemaLoad",
            Self::Serialization => "Serialization",
            Self::Packaging => "Packaging",
            Self::Configuration => "Configuration",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.id())
    }
}

/// Errors that can occur while generating permits.
#[derive(Debug, Error)]
pub enum PermitError {
    /// Request or upstream payload failed structural/semantic validation.
    #[error("Validation failed with {} error(s)", .errors.len())]
    Validation {
        /// Every violation found.
        errors: Vec<FieldError>,
    },

    /// Upstream returned 400 or 404 with an error body.
    #[error("{origin} rejected the request with status {status}")]
    UpstreamDomain {
        /// Service that failed.
        origin: UpstreamService,
        /// HTTP status returned.
        status: u16,
        /// Error body returned by the service.
        detail: ErrorResponse,
    },

    /// Upstream returned a status that is neither success nor a domain failure.
    #[error("{origin} request failed with status {status}")]
    UpstreamFailure {
        /// Service that failed.
        origin: UpstreamService,
        /// HTTP status returned.
        status: u16,
    },

    /// Upstream kept returning 429/503 until the retry budget ran out.
    #[error("{origin} unavailable after {attempts} attempt(s), last status {status}")]
    RetriesExhausted {
        /// Service that failed.
        origin: UpstreamService,
        /// Last HTTP status seen.
        status: u16,
        /// Total attempts made.
        attempts: u32,
    },

    /// Request could not be sent or the response could not be read.
    #[error("{origin} transport error: {message}")]
    Transport {
        /// Service that failed.
        origin: UpstreamService,
        /// Transport error message.
        message: String,
    },

    /// Successful response whose body could not be parsed.
    #[error("{origin} returned an unreadable body: {message}")]
    InvalidResponse {
        /// Service that failed.
        origin: UpstreamService,
        /// Parse error message.
        message: String,
    },

    /// Bearer token acquisition failed.
    #[error("Token acquisition failed for scope {scope}: {message}")]
    Token {
        /// Token scope requested.
        scope: String,
        /// Failure message.
        message: String,
    },

    /// No manufacturer key exists for a UPN's manufacturer id.
    #[error("Manufacturer key not found for manufacturer {manufacturer_id}")]
    ManufacturerKeyNotFound {
        /// Manufacturer id from the UPN.
        manufacturer_id: String,
    },

    /// Key service returned no key for a held cell.
    #[error("No product key returned for {product_name} edition {edition}")]
    ProductKeyMissing {
        /// Cell code.
        product_name: String,
        /// Edition number.
        edition: String,
    },

    /// Permit XML failed schema validation.
    #[error("Permit failed schema validation with {} violation(s)", .violations.len())]
    InvalidSchema {
        /// Every violation found.
        violations: Vec<String>,
    },

    /// Schema could not be loaded or compiled.
    #[error("Schema could not be loaded: {message}")]
    SchemaLoad {
        /// Failure message.
        message: String,
    },

    /// Permit could not be serialized to XML.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Failure message.
        message: String,
    },

    /// Signed permits could not be written to their destination.
    #[error("Failed to write {path}: {message}")]
    Packaging {
        /// Destination that failed.
        path: String,
        /// I/O error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Failure message.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Secret store error.
    #[error("Secret store error: {0}")]
    Secret(#[from] KeyringError),
}

impl PermitError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::RequestValidation,
            Self::UpstreamDomain { .. } => ErrorCode::UpstreamDomainFailure,
            Self::UpstreamFailure { .. } => ErrorCode::UpstreamFailure,
            Self::RetriesExhausted { .. } => ErrorCode::UpstreamRetriesExhausted,
            Self::Transport { .. } => ErrorCode::UpstreamTransport,
            Self::InvalidResponse { .. } => ErrorCode::UpstreamInvalidResponse,
            Self::Token { .. } => ErrorCode::TokenAcquisition,
            Self::ManufacturerKeyNotFound { .. } => ErrorCode::ManufacturerKeyNotFound,
            Self::ProductKeyMissing { .. } => ErrorCode::ProductKeyMissing,
            Self::InvalidSchema { .. } => ErrorCode::InvalidSchema,
            Self::SchemaLoad { .. } => ErrorCode::SchemaLoad,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::Packaging { .. } => ErrorCode::Packaging,
            Self::Config { .. } => ErrorCode::Configuration,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Crypto(_) => ErrorCode::Crypto,
            Self::Secret(_) => ErrorCode::SecretStore,
        }
    }

    /// Upstream service the error originated from, if any.
    #[must_use]
    pub fn origin(&self) -> Option<UpstreamService> {
        match self {
            Self::UpstreamDomain { origin, .. }
            | Self::UpstreamFailure { origin, .. }
            | Self::RetriesExhausted { origin, .. }
            | Self::Transport { origin, .. }
            | Self::InvalidResponse { origin, .. } => Some(*origin),
            Self::Token { .. } => Some(UpstreamService::TokenService),
            _ => None,
        }
    }

    /// HTTP-status-like outcome code for the caller.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::UpstreamDomain { status, .. } => *status,
            _ => 500,
        }
    }

    /// Whether the caller's request itself was at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Translate into a caller-facing error body.
    #[must_use]
    pub fn to_response(&self, correlation_id: &str) -> ErrorResponse {
        let errors = match self {
            Self::Validation { errors } => errors
                .iter()
                .map(|e| ErrorDetail::new(e.field.clone(), e.message.clone()))
                .collect(),
            Self::UpstreamDomain { detail, .. } if !detail.errors.is_empty() => {
                detail.errors.clone()
            },
            _ => vec![ErrorDetail::new(self.code().as_str(), self.to_string())],
        };

        ErrorResponse {
            correlation_id: Some(correlation_id.to_string()),
            errors,
            origin: self.origin().map(|o| o.to_string()),
        }
    }
}

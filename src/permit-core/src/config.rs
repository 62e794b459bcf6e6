//! Configuration for the permit pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PermitError;

/// Location and token client id of one upstream service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoint {
    /// Base URL, without trailing path.
    pub base_url: String,
    /// Client id the bearer token is scoped to.
    pub client_id: String,
}

impl ServiceEndpoint {
    /// Create an endpoint.
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
        }
    }
}

/// Retry policy for transient upstream failures (429/503).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub retry_count: u32,
    /// Base of the exponential backoff, in seconds.
    pub sleep_duration_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            sleep_duration_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): `base^(attempt-1)` seconds.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.sleep_duration_base.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Total delay before retry number `attempt`, honouring an explicit
    /// `Retry-After` delay ahead of the backoff.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or_default()
            .saturating_add(self.backoff(attempt))
    }
}

/// Configuration for the permit pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermitConfig {
    /// Holdings service.
    pub holdings_service: ServiceEndpoint,
    /// User permit service.
    pub user_permit_service: ServiceEndpoint,
    /// Product key service.
    pub product_key_service: ServiceEndpoint,
    /// Retry policy shared by all upstream clients.
    pub retry: RetryPolicy,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Data server name written into every permit header.
    pub data_server_name: String,
    /// Data server identifier written into every permit header.
    pub data_server_identifier: String,

    /// Hardware id the product key service encrypts keys under.
    pub manufacturer_neutral_hardware_id: String,
    /// How long a manufacturer key stays cached.
    pub manufacturer_key_cache_hours: u64,

    /// Safety margin subtracted from token lifetimes before caching.
    pub token_expiry_margin_secs: u64,
    /// OAuth2 token endpoint for client-credentials tokens.
    pub token_endpoint: String,
    /// Client id used to request tokens.
    pub token_client_id: String,
    /// Secret-store name of the client secret.
    pub token_client_secret_name: String,

    /// Secret-store name of the Base64 EC signing key.
    pub signing_key_secret_name: String,
    /// Secret-store name of the signing certificate.
    pub certificate_secret_name: String,
    /// Certificate id referenced by signature documents.
    pub certificate_id: String,

    /// Permit XSD to validate against; the bundled schema when absent.
    pub schema_path: Option<PathBuf>,
    /// Accept request products whose expiry date is in the past.
    pub allow_past_expiry: bool,

    /// File name of the permit document in packaged output.
    pub permit_filename: String,
    /// File name of the signature document in packaged output.
    pub signature_filename: String,
}

impl Default for PermitConfig {
    fn default() -> Self {
        Self {
            holdings_service: ServiceEndpoint::new("http://localhost:8080", "holdings"),
            user_permit_service: ServiceEndpoint::new("http://localhost:8080", "userpermits"),
            product_key_service: ServiceEndpoint::new("http://localhost:8080", "productkeys"),
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
            data_server_name: "S-100 Permit Service".into(),
            data_server_identifier: "GB00".into(),
            manufacturer_neutral_hardware_id: String::new(),
            manufacturer_key_cache_hours: 2,
            token_expiry_margin_secs: 300,
            token_endpoint: String::new(),
            token_client_id: String::new(),
            token_client_secret_name: "token-client-secret".into(),
            signing_key_secret_name: "permit-signing-key".into(),
            certificate_secret_name: "permit-signing-certificate".into(),
            certificate_id: "CERT".into(),
            schema_path: None,
            allow_past_expiry: false,
            permit_filename: "PERMIT.XML".into(),
            signature_filename: "PERMIT.SIGN".into(),
        }
    }
}

impl PermitConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or fails [`Self::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PermitError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PermitError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            PermitError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Config`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), PermitError> {
        for (name, endpoint) in [
            ("holdings_service", &self.holdings_service),
            ("user_permit_service", &self.user_permit_service),
            ("product_key_service", &self.product_key_service),
        ] {
            if endpoint.base_url.trim().is_empty() {
                return Err(PermitError::config(format!("{name}.base_url is empty")));
            }
        }

        let hwid = &self.manufacturer_neutral_hardware_id;
        if hwid.len() != 32 || !hwid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PermitError::config(
                "manufacturer_neutral_hardware_id must be 32 hex characters",
            ));
        }

        if !self.retry.sleep_duration_base.is_finite() || self.retry.sleep_duration_base <= 0.0 {
            return Err(PermitError::config(
                "retry.sleep_duration_base must be positive",
            ));
        }

        Ok(())
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Manufacturer key cache lifetime.
    #[must_use]
    pub fn manufacturer_key_ttl(&self) -> Duration {
        Duration::from_secs(self.manufacturer_key_cache_hours * 60 * 60)
    }

    /// Token expiry safety margin.
    #[must_use]
    pub fn token_expiry_margin(&self) -> Duration {
        Duration::from_secs(self.token_expiry_margin_secs)
    }
}

//! Wire types exchanged with the upstream services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One user permit as returned by the user permit service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermit {
    /// Display title of the user/vessel the permit belongs to.
    #[serde(default)]
    pub title: String,

    /// Raw 46-character user permit number.
    #[serde(default)]
    pub upn: String,
}

impl UserPermit {
    /// Create a user permit.
    pub fn new(title: impl Into<String>, upn: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            upn: upn.into(),
        }
    }
}

/// Body of `GET /userpermits/{licenceId}/s100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermitServiceResponse {
    /// Licence the permits belong to.
    pub licence_id: i64,

    /// Permits held under the licence.
    #[serde(default)]
    pub user_permits: Vec<UserPermit>,
}

/// One product holding from `GET /holdings/{licenceId}/s100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Product code.
    pub product_code: String,

    /// Product title.
    pub product_title: String,

    /// When the entitlement ends.
    pub expiry_date: DateTime<Utc>,

    /// Cells covered by this holding.
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// Smallest licensable unit of chart data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Cell code, e.g. `101GB004`.
    pub cell_code: String,

    /// Cell title.
    #[serde(default)]
    pub cell_title: String,

    /// Latest edition number.
    #[serde(deserialize_with = "string_or_number")]
    pub latest_edition_number: String,

    /// Latest update number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub latest_update_number: String,
}

/// One entry of the `POST /keys/s100` request body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductKeyRequest {
    /// Cell code the key is requested for.
    pub product_name: String,

    /// Edition number.
    #[serde(deserialize_with = "string_or_number")]
    pub edition: String,
}

/// One entry of the `POST /keys/s100` response body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductKey {
    /// Cell code.
    pub product_name: String,

    /// Edition number.
    #[serde(deserialize_with = "string_or_number")]
    pub edition: String,

    /// Product key, encrypted under the manufacturer-neutral hardware id.
    pub key: String,
}

impl std::fmt::Debug for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductKey")
            .field("product_name", &self.product_name)
            .field("edition", &self.edition)
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Structured error body returned by upstream services on 400/404, and
/// returned to callers of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Correlation id of the failing request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Itemized errors.
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,

    /// Service the error originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// One itemized error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Field or component the error refers to.
    pub source: String,

    /// Description of the problem.
    pub description: String,
}

impl ErrorDetail {
    /// Create an error detail.
    pub fn new(source: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            description: description.into(),
        }
    }
}

/// Upstream services disagree on whether edition numbers are JSON strings
/// or numbers; accept both.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

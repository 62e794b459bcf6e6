//! Upstream service clients.
//!
//! Each service is a trait so the pipeline can run against the HTTP clients
//! in this module or any other implementation.
//!
//! | Service | Request |
//! |---------|---------|
//! | User permits | `GET {base}/userpermits/{licenceId}/s100` |
//! | Holdings | `GET {base}/holdings/{licenceId}/s100` |
//! | Product keys | `POST {base}/keys/s100` |

mod holdings;
mod product_keys;
mod user_permits;

pub use holdings::HoldingsClient;
pub use product_keys::ProductKeyClient;
pub use user_permits::UserPermitClient;

use async_trait::async_trait;

use crate::error::PermitError;
use crate::https::RequestContext;
use crate::types::{Holding, ProductKey, ProductKeyRequest, UserPermitServiceResponse};

/// Source of a licence's user permits.
#[async_trait]
pub trait UserPermitApi: Send + Sync {
    /// Fetch the user permits for `licence_id`. `None` means no payload.
    async fn get_user_permits(
        &self,
        licence_id: i64,
        ctx: &RequestContext,
    ) -> Result<Option<UserPermitServiceResponse>, PermitError>;
}

/// Source of a licence's holdings.
#[async_trait]
pub trait HoldingsApi: Send + Sync {
    /// Fetch the holdings for `licence_id`. `None` means no payload.
    async fn get_holdings(
        &self,
        licence_id: i64,
        ctx: &RequestContext,
    ) -> Result<Option<Vec<Holding>>, PermitError>;
}

/// Issuer of product keys.
#[async_trait]
pub trait ProductKeyApi: Send + Sync {
    /// Fetch keys for every requested (product, edition) pair.
    async fn get_product_keys(
        &self,
        requests: &[ProductKeyRequest],
        ctx: &RequestContext,
    ) -> Result<Vec<ProductKey>, PermitError>;
}

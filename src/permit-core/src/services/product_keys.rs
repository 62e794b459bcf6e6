//! Product key service client.
//!
//! Keys come back encrypted under the manufacturer-neutral hardware id.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::ProductKeyApi;
use crate::error::PermitError;
use crate::https::{RequestContext, ServiceClient};
use crate::types::{ProductKey, ProductKeyRequest};

/// HTTP client for the product key service.
pub struct ProductKeyClient {
    inner: ServiceClient,
}

impl ProductKeyClient {
    /// Wrap a service client.
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ProductKeyApi for ProductKeyClient {
    #[instrument(
        skip(self, requests, ctx),
        fields(requested = requests.len(), correlation_id = %ctx.correlation_id)
    )]
    async fn get_product_keys(
        &self,
        requests: &[ProductKeyRequest],
        ctx: &RequestContext,
    ) -> Result<Vec<ProductKey>, PermitError> {
        let keys: Option<Vec<ProductKey>> = self.inner.post_json("/keys/s100", requests, ctx).await?;
        let keys = keys.unwrap_or_default();
        info!(received = keys.len(), "Product keys received");
        Ok(keys)
    }
}

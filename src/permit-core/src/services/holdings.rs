//! Holdings service client.
//!
//! An empty or `null` body means the licence holds nothing.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::HoldingsApi;
use crate::error::PermitError;
use crate::https::{RequestContext, ServiceClient};
use crate::types::Holding;

/// HTTP client for the holdings service.
pub struct HoldingsClient {
    inner: ServiceClient,
}

impl HoldingsClient {
    /// Wrap a service client.
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HoldingsApi for HoldingsClient {
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    async fn get_holdings(
        &self,
        licence_id: i64,
        ctx: &RequestContext,
    ) -> Result<Option<Vec<Holding>>, PermitError> {
        let path = format!("/holdings/{licence_id}/s100");
        let holdings: Option<Vec<Holding>> = self.inner.get_json(&path, ctx).await?;
        info!(
            holdings = holdings.as_ref().map_or(0, Vec::len),
            "Holdings received"
        );
        Ok(holdings)
    }
}

//! User permit service client.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::UserPermitApi;
use crate::error::PermitError;
use crate::https::{RequestContext, ServiceClient};
use crate::types::UserPermitServiceResponse;

/// HTTP client for the user permit service.
pub struct UserPermitClient {
    inner: ServiceClient,
}

impl UserPermitClient {
    /// Wrap a service client.
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl UserPermitApi for UserPermitClient {
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    async fn get_user_permits(
        &self,
        licence_id: i64,
        ctx: &RequestContext,
    ) -> Result<Option<UserPermitServiceResponse>, PermitError> {
        let path = format!("/userpermits/{licence_id}/s100");
        let response: Option<UserPermitServiceResponse> = self.inner.get_json(&path, ctx).await?;
        info!(
            permits = response.as_ref().map_or(0, |r| r.user_permits.len()),
            "User permits received"
        );
        Ok(response)
    }
}

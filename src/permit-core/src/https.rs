//! Resilient HTTP client shared by the upstream service clients.
//!
//! ## Response classification
//!
//! - `2xx`: success; the body is parsed as JSON (an empty body or `null` is
//!   "no payload")
//! - `400` / `404`: domain failure carrying the body as an [`ErrorResponse`]
//! - `429` / `503`: transient, retried per [`RetryPolicy`]
//! - anything else: generic failure, body ignored
//!
//! ## Retry
//!
//! Before retry `n` the client waits `sleep_duration_base^(n-1)` seconds. On
//! `429` a `Retry-After` header (milliseconds) is waited out first. Every
//! retry is logged with the URI, delay, attempt number and correlation id.
//!
//! Cancelling the request context aborts both in-flight requests and pending
//! retry delays.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RetryPolicy, ServiceEndpoint};
use crate::error::{PermitError, UpstreamService};
use crate::token::TokenProvider;
use crate::types::{ErrorDetail, ErrorResponse};

/// Header carrying the correlation id to upstream services.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Per-request context threaded through every upstream call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id propagated to upstreams and logs.
    pub correlation_id: String,
    /// Cancellation signal from the caller.
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context sharing the caller's cancellation token.
    pub fn with_cancellation(correlation_id: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancellation,
        }
    }

    /// Fail with [`PermitError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Cancelled`] once the token is cancelled.
    pub fn check_cancelled(&self) -> Result<(), PermitError> {
        if self.cancellation.is_cancelled() {
            Err(PermitError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Build the shared reqwest client.
///
/// # Errors
///
/// Returns [`PermitError::Config`] if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<Client, PermitError> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(format!("permit-core/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PermitError::config(format!("Failed to create HTTP client: {e}")))
}

/// HTTP client bound to one upstream service.
pub struct ServiceClient {
    client: Client,
    base_url: String,
    client_id: String,
    origin: UpstreamService,
    tokens: Arc<TokenProvider>,
    retry: RetryPolicy,
}

impl ServiceClient {
    /// Create a client for `endpoint`.
    pub fn new(
        client: Client,
        endpoint: &ServiceEndpoint,
        origin: UpstreamService,
        tokens: Arc<TokenProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            client_id: endpoint.client_id.clone(),
            origin,
            tokens,
            retry,
        }
    }

    /// Service this client talks to.
    pub fn origin(&self) -> UpstreamService {
        self.origin
    }

    /// `GET {base_url}{path}` and parse the JSON body.
    ///
    /// # Errors
    ///
    /// Returns a classified [`PermitError`] per the module rules.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        ctx: &RequestContext,
    ) -> Result<Option<T>, PermitError> {
        let body = self.execute(Method::GET, path, None, ctx).await?;
        self.parse_body(&body)
    }

    /// `POST {base_url}{path}` with a JSON body and parse the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a classified [`PermitError`] per the module rules.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
        ctx: &RequestContext,
    ) -> Result<Option<T>, PermitError> {
        let encoded = serde_json::to_vec(payload)
            .map_err(|e| PermitError::serialization(format!("request body: {e}")))?;
        let body = self.execute(Method::POST, path, Some(encoded), ctx).await?;
        self.parse_body(&body)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<Vec<u8>>,
        ctx: &RequestContext,
    ) -> Result<Vec<u8>, PermitError> {
        ctx.check_cancelled()?;
        let url = format!("{}{}", self.base_url, path);

        let token = self.tokens.get_token(&self.client_id).await?;
        if token.is_empty() {
            warn!(
                origin = %self.origin,
                correlation_id = %ctx.correlation_id,
                "Bearer token is empty, sending request without authorization"
            );
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(CORRELATION_ID_HEADER, ctx.correlation_id.as_str());
            if !token.is_empty() {
                request = request.bearer_auth(token.as_str());
            }
            if let Some(body) = &payload {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            debug!(url = %url, method = %method, attempt, "HTTPS: Sending request");
            let response = tokio::select! {
                () = ctx.cancellation.cancelled() => return Err(PermitError::Cancelled),
                result = request.send() => result.map_err(|e| {
                    warn!(url = %url, error = %e, "HTTPS request failed");
                    self.transport_error(&e)
                })?,
            };

            let status = response.status();
            info!(url = %url, status = %status, "HTTPS: Response received");

            if is_transient(status) {
                if attempt > self.retry.retry_count {
                    warn!(url = %url, status = %status, attempts = attempt, "HTTPS: Retries exhausted");
                    return Err(PermitError::RetriesExhausted {
                        origin: self.origin,
                        status: status.as_u16(),
                        attempts: attempt,
                    });
                }

                let explicit_delay = if status == StatusCode::TOO_MANY_REQUESTS {
                    retry_after(response.headers())
                } else {
                    None
                };
                let delay = self.retry.delay_for(attempt, explicit_delay);
                warn!(
                    uri = %url,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    correlation_id = %ctx.correlation_id,
                    status = status.as_u16(),
                    "HTTPS: Transient failure, retrying"
                );

                tokio::select! {
                    () = ctx.cancellation.cancelled() => return Err(PermitError::Cancelled),
                    () = tokio::time::sleep(delay) => {},
                }
                continue;
            }

            let body = tokio::select! {
                () = ctx.cancellation.cancelled() => return Err(PermitError::Cancelled),
                result = response.bytes() => result.map_err(|e| self.transport_error(&e))?,
            };

            return self.classify(status, body.to_vec());
        }
    }

    fn classify(&self, status: StatusCode, body: Vec<u8>) -> Result<Vec<u8>, PermitError> {
        if status.is_success() {
            return Ok(body);
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            let mut detail = serde_json::from_slice::<ErrorResponse>(&body).unwrap_or_else(|_| {
                ErrorResponse {
                    errors: vec![ErrorDetail::new(
                        self.origin.to_string(),
                        String::from_utf8_lossy(&body).into_owned(),
                    )],
                    ..ErrorResponse::default()
                }
            });
            detail.origin = Some(self.origin.to_string());
            warn!(origin = %self.origin, status = %status, "HTTPS: Domain failure");
            return Err(PermitError::UpstreamDomain {
                origin: self.origin,
                status: status.as_u16(),
                detail,
            });
        }

        warn!(origin = %self.origin, status = %status, "HTTPS: Non-success status");
        Err(PermitError::UpstreamFailure {
            origin: self.origin,
            status: status.as_u16(),
        })
    }

    fn parse_body<T: DeserializeOwned>(&self, body: &[u8]) -> Result<Option<T>, PermitError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice::<Option<T>>(body).map_err(|e| {
            warn!(origin = %self.origin, error = %e, "HTTPS: Failed to parse JSON response");
            PermitError::InvalidResponse {
                origin: self.origin,
                message: e.to_string(),
            }
        })
    }

    fn transport_error(&self, error: &reqwest::Error) -> PermitError {
        PermitError::Transport {
            origin: self.origin,
            message: error.to_string(),
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS
}

/// `Retry-After` interpreted as a millisecond count.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}

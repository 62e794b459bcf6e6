//! Bearer token acquisition.
//!
//! A [`TokenSource`] fetches fresh tokens; [`TokenProvider`] caches them per
//! scope until the token's own expiry minus a safety margin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::cache::TtlCache;
use crate::error::PermitError;

/// A freshly issued bearer token.
#[derive(Clone)]
pub struct AccessToken {
    /// Token value.
    pub token: Zeroizing<String>,
    /// Lifetime from the moment of issue.
    pub expires_in: Duration,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_len", &self.token.len())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Issues bearer tokens for a resource scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a new token for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::Token`] if no token can be issued.
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken, PermitError>;
}

/// Token source returning a fixed token for every scope.
#[derive(Clone)]
pub struct StaticTokenSource {
    token: Zeroizing<String>,
    expires_in: Duration,
}

impl StaticTokenSource {
    /// Create a static source. An empty token is allowed.
    pub fn new(token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            expires_in,
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self, _scope: &str) -> Result<AccessToken, PermitError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_in: self.expires_in,
        })
    }
}

/// OAuth2 client-credentials token source.
pub struct ClientCredentialsTokenSource {
    client: Client,
    endpoint: String,
    client_id: String,
    client_secret: Zeroizing<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl ClientCredentialsTokenSource {
    /// Create a source posting to `endpoint`.
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsTokenSource {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken, PermitError> {
        let token_error = |message: String| PermitError::Token {
            scope: scope.to_string(),
            message,
        };

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| token_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Token endpoint returned non-success status");
            return Err(token_error(format!("HTTP {status}")));
        }

        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| token_error(format!("unreadable token response: {e}")))?;

        debug!(expires_in = body.expires_in, "Token issued");
        Ok(AccessToken {
            token: Zeroizing::new(body.access_token),
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

/// Caching front for a [`TokenSource`].
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    cache: TtlCache<Zeroizing<String>>,
    margin: Duration,
}

impl TokenProvider {
    /// Create a provider caching tokens until `expiry - margin`.
    pub fn new(source: Arc<dyn TokenSource>, margin: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            margin,
        }
    }

    /// Scope requested for a service client id.
    #[must_use]
    pub fn scope_for(client_id: &str) -> String {
        format!("{client_id}/.default")
    }

    /// Get a bearer token for the service identified by `client_id`.
    ///
    /// # Errors
    ///
    /// Returns the source's error on a cache miss that cannot be filled.
    #[instrument(skip(self))]
    pub async fn get_token(&self, client_id: &str) -> Result<Zeroizing<String>, PermitError> {
        let scope = Self::scope_for(client_id);
        self.cache
            .get_or_try_insert_with(&scope, || async {
                let issued = self.source.fetch_token(&scope).await?;
                let ttl = issued.expires_in.saturating_sub(self.margin);
                if ttl.is_zero() {
                    info!(scope = %scope, "Token lifetime within margin, not caching");
                }
                Ok::<_, PermitError>((issued.token, ttl))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        expires_in: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self, scope: &str) -> Result<AccessToken, PermitError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                token: Zeroizing::new(format!("{scope}#{n}")),
                expires_in: self.expires_in,
            })
        }
    }

    #[tokio::test]
    async fn test_token_cached_per_scope() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_in: Duration::from_secs(3600),
        });
        let provider = TokenProvider::new(source.clone(), Duration::from_secs(300));

        let first = provider.get_token("holdings").await.unwrap();
        let again = provider.get_token("holdings").await.unwrap();
        let other = provider.get_token("keys").await.unwrap();

        assert_eq!(first.as_str(), "holdings/.default#0");
        assert_eq!(again.as_str(), first.as_str());
        assert_eq!(other.as_str(), "keys/.default#1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_lived_token_not_cached() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_in: Duration::from_secs(60),
        });
        let provider = TokenProvider::new(source.clone(), Duration::from_secs(300));

        provider.get_token("holdings").await.unwrap();
        provider.get_token("holdings").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_source() {
        let provider = TokenProvider::new(
            Arc::new(StaticTokenSource::new("", Duration::from_secs(3600))),
            Duration::from_secs(300),
        );
        assert!(provider.get_token("any").await.unwrap().is_empty());
    }

    #[test]
    fn test_access_token_debug_hides_value() {
        let token = AccessToken {
            token: Zeroizing::new("secret-token".into()),
            expires_in: Duration::from_secs(1),
        };
        assert!(!format!("{token:?}").contains("secret-token"));
    }
}

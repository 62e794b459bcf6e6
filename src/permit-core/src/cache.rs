//! In-memory TTL caches.
//!
//! [`TtlCache`] is the shared building block: a key to (value, expiry) map
//! with a get-or-populate operation serialized per key, so concurrent misses
//! for the same key trigger one upstream fetch. Expired entries are treated
//! as absent and overwritten on the next populate; nothing evicts them
//! proactively.
//!
//! [`ManufacturerKeyCache`] sits on top of it and resolves manufacturer keys
//! from the secret store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use permit_keyring::SecretStore;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::error::PermitError;

/// A cached value.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Key to value map with per-entry expiry.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an unexpired value.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace a value. A zero `ttl` stores nothing.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return;
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), CacheEntry { value, expires_at });
        }
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.is_valid()).count())
            .unwrap_or(0)
    }

    /// Whether there are no unexpired entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value for `key`, or run `populate` and cache its
    /// result for the TTL it returns.
    ///
    /// Concurrent callers for the same key wait for the first populate
    /// instead of running their own.
    ///
    /// # Errors
    ///
    /// Returns the error from `populate`; nothing is cached in that case.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, populate: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Duration), E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let key_lock = self.key_lock(key);
        let _guard = key_lock.lock().await;

        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let (value, ttl) = populate().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(key.to_string()).or_default().clone(),
            // Poisoned map: fall back to an unshared lock.
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Cache of manufacturer keys, keyed by manufacturer id.
///
/// On a miss the key is fetched from the secret store under the manufacturer
/// id as the secret name and cached for the configured TTL.
pub struct ManufacturerKeyCache {
    store: Arc<dyn SecretStore>,
    cache: TtlCache<Zeroizing<String>>,
    ttl: Duration,
}

impl ManufacturerKeyCache {
    /// Create a cache backed by `store`.
    pub fn new(store: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Resolve the manufacturer key for `manufacturer_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PermitError::ManufacturerKeyNotFound`] if the store has no
    /// such secret, or [`PermitError::Secret`] on other store failures.
    #[instrument(skip(self))]
    pub async fn get(&self, manufacturer_id: &str) -> Result<Zeroizing<String>, PermitError> {
        self.cache
            .get_or_try_insert_with(manufacturer_id, || async {
                debug!("Manufacturer key cache miss");
                let key = self.store.get_secret(manufacturer_id).await.map_err(|e| {
                    if e.is_not_found() {
                        PermitError::ManufacturerKeyNotFound {
                            manufacturer_id: manufacturer_id.to_string(),
                        }
                    } else {
                        PermitError::from(e)
                    }
                })?;
                Ok::<_, PermitError>((Zeroizing::new(key), self.ttl))
            })
            .await
    }

    /// Load every manufacturer key from the secret store into the cache.
    ///
    /// Secrets whose value is not a 32-hex-character key are skipped. Store
    /// failures are logged and do not abort priming. Returns the number of
    /// keys cached.
    #[instrument(skip(self))]
    pub async fn prime(&self) -> usize {
        let names = match self.store.list_secret_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Manufacturer key cache priming skipped");
                return 0;
            },
        };

        let mut loaded = 0;
        for name in names {
            match self.store.get_secret(&name).await {
                Ok(value) if is_block_key(&value) => {
                    self.cache.insert(name, Zeroizing::new(value), self.ttl);
                    loaded += 1;
                },
                Ok(_) => debug!(name = %name, "Skipping non-manufacturer secret"),
                Err(e) => warn!(name = %name, error = %e, "Failed to load manufacturer key"),
            }
        }

        info!(loaded, "Manufacturer key cache primed");
        loaded
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn is_block_key(value: &str) -> bool {
    value.len() == permit_crypto::BLOCK_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

//! JWKS fetch-and-cache layer, shared by every OIDC-backed provider adapter.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::jwk::JwkSet;
use tracing::debug;

use crate::error::{Error, Result};

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// JWKS cache, one entry per issuer. Refreshed on TTL expiry or on an
/// explicit `force_refresh` (used when a `kid` isn't found in the cached
/// set — the key may have rotated).
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksCache {
    /// Create with the default 1 hour TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
            http: reqwest::Client::builder()
                .https_only(true)
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            ttl: Duration::from_secs(3600),
        }
    }

    /// Return the cached JWKS for `issuer`, fetching from `jwks_uri` if
    /// stale or `force_refresh` is set.
    pub async fn get_or_fetch(&self, issuer: &str, jwks_uri: &str, force_refresh: bool) -> Result<JwkSet> {
        if !force_refresh
            && let Some(cached) = self.inner.get(issuer)
            && !cached.is_stale()
        {
            return Ok(cached.keys.clone());
        }

        debug!(issuer = %issuer, "fetching JWKS from {jwks_uri}");
        let jwks: JwkSet = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(Error::Http)?
            .json()
            .await
            .map_err(Error::Http)?;

        self.inner.insert(
            issuer.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        Ok(jwks)
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

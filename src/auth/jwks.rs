// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing key resolution from the realm's JWKS endpoint.
//!
//! ## Caching
//!
//! - Keys are cached per `kid` in a bounded LRU; the oldest entries are
//!   evicted past the capacity
//! - Each entry expires a fixed time after it was fetched, whether or not it
//!   was used in between
//! - A miss triggers one fetch of the whole key set and every returned key is
//!   stored, not just the requested one
//!
//! ## Throttling
//!
//! Refetches are capped per minute so a stream of tokens with unknown `kid`
//! values cannot hammer the realm. Once the cap is hit, lookups that would
//! need a fetch fail with [`KeyResolveError::UpstreamUnavailable`] instead of
//! waiting.
//!
//! Readiness checks warm the cache through [`KeyResolver::warm`], which has
//! its own small budget and never spends the lookup cap.
//!
//! Concurrent misses for the same key may both fetch; each fetch replaces
//! entries wholesale, so the last writer wins with equally valid keys.

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use lru::LruCache;
use tracing::{debug, warn};

use crate::config::KeySetSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyResolveError {
    #[error("no signing key with kid {0:?} in the realm key set")]
    KeyNotFound(String),

    #[error("realm key set unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Fetches per minute allowed to readiness checks.
const WARM_FETCHES_PER_MINUTE: NonZeroU32 = NonZeroU32::MIN.saturating_add(1);

/// A public verification key and its identifier.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    /// Algorithm the key set pins this key to, if any.
    pub algorithm: Option<Algorithm>,
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

struct CachedKey {
    key: Arc<SigningKey>,
    fetched_at: Instant,
}

/// Resolves `kid` values to signing keys, fetching the key set on demand.
pub struct KeyResolver {
    jwks_url: String,
    ttl: Duration,
    timeout: Duration,
    cache: Mutex<LruCache<String, CachedKey>>,
    refetch_limiter: DefaultDirectRateLimiter,
    warm_limiter: DefaultDirectRateLimiter,
    client: reqwest::Client,
}

impl KeyResolver {
    pub fn new(jwks_url: impl Into<String>, settings: &KeySetSettings, client: reqwest::Client) -> Self {
        let capacity = NonZeroUsize::new(settings.max_entries).unwrap_or(NonZeroUsize::MIN);
        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            jwks_url: jwks_url.into(),
            ttl: settings.ttl,
            timeout: settings.timeout,
            cache: Mutex::new(LruCache::new(capacity)),
            refetch_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            warm_limiter: RateLimiter::direct(Quota::per_minute(WARM_FETCHES_PER_MINUTE)),
            client,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Resolve the key for `kid`, fetching the key set on a miss.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolveError> {
        if let Some(key) = self.cached(kid) {
            return Ok(key);
        }

        let keys = self.refetch().await?;
        keys.into_iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| KeyResolveError::KeyNotFound(kid.to_string()))
    }

    /// Fetch the key set now and replace cached entries. Uses the readiness
    /// budget, leaving the refetch cap to token verification.
    pub async fn warm(&self) -> Result<usize, KeyResolveError> {
        if self.warm_limiter.check().is_err() {
            return Err(KeyResolveError::UpstreamUnavailable(
                "key set warm-up rate limit reached".to_string(),
            ));
        }
        self.fetch_and_store().await.map(|keys| keys.len())
    }

    /// Number of unexpired keys currently cached.
    pub fn cached_key_count(&self) -> usize {
        let Ok(cache) = self.cache.lock() else {
            return 0;
        };
        cache
            .iter()
            .filter(|(_, entry)| entry.fetched_at.elapsed() < self.ttl)
            .count()
    }

    fn cached(&self, kid: &str) -> Option<Arc<SigningKey>> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(kid) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.key.clone());
            }
            cache.pop(kid);
        }
        None
    }

    async fn refetch(&self) -> Result<Vec<Arc<SigningKey>>, KeyResolveError> {
        if self.refetch_limiter.check().is_err() {
            warn!(jwks_url = %self.jwks_url, "JWKS refetch rate limit reached");
            return Err(KeyResolveError::UpstreamUnavailable(
                "key set refetch rate limit reached".to_string(),
            ));
        }
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<Vec<Arc<SigningKey>>, KeyResolveError> {
        let jwks = tokio::time::timeout(self.timeout, self.fetch_jwks())
            .await
            .map_err(|_| {
                KeyResolveError::UpstreamUnavailable("key set request timed out".to_string())
            })??;

        let keys: Vec<Arc<SigningKey>> = jwks
            .keys
            .iter()
            .filter_map(|jwk| match signing_key_from_jwk(jwk) {
                Ok(key) => Some(Arc::new(key)),
                Err(reason) => {
                    debug!(kid = ?jwk.common.key_id, reason, "Skipping unusable JWK");
                    None
                }
            })
            .collect();

        debug!(jwks_url = %self.jwks_url, count = keys.len(), "Fetched realm signing keys");

        if let Ok(mut cache) = self.cache.lock() {
            let fetched_at = Instant::now();
            for key in &keys {
                cache.put(
                    key.kid.clone(),
                    CachedKey {
                        key: key.clone(),
                        fetched_at,
                    },
                );
            }
        }

        Ok(keys)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, KeyResolveError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyResolveError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyResolveError::UpstreamUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| KeyResolveError::UpstreamUnavailable(format!("invalid key set: {e}")))
    }
}

/// Convert a JWK into a signing key. Keys without a `kid`, encryption keys
/// and symmetric keys are not usable for verification here.
fn signing_key_from_jwk(jwk: &Jwk) -> Result<SigningKey, &'static str> {
    let kid = jwk.common.key_id.clone().ok_or("missing kid")?;
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err("encryption key");
    }

    let decoding_key = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|_| "invalid RSA components")?,
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
            .map_err(|_| "invalid EC components")?,
        AlgorithmParameters::OctetKeyPair(okp) => {
            DecodingKey::from_ed_components(&okp.x).map_err(|_| "invalid OKP components")?
        }
        _ => return Err("unsupported key type"),
    };

    let algorithm = match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Some(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Some(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Some(Algorithm::RS512),
        Some(KeyAlgorithm::PS256) => Some(Algorithm::PS256),
        Some(KeyAlgorithm::PS384) => Some(Algorithm::PS384),
        Some(KeyAlgorithm::PS512) => Some(Algorithm::PS512),
        Some(KeyAlgorithm::ES256) => Some(Algorithm::ES256),
        Some(KeyAlgorithm::ES384) => Some(Algorithm::ES384),
        Some(KeyAlgorithm::EdDSA) => Some(Algorithm::EdDSA),
        Some(_) => return Err("key pinned to an unsupported algorithm"),
        None => None,
    };

    Ok(SigningKey {
        kid,
        algorithm,
        decoding_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, spawn_upstream, HitCounter, TEST_KID, TEST_RSA_N};
    use axum::{routing::get, Json, Router};

    fn settings(requests_per_minute: u32) -> KeySetSettings {
        KeySetSettings {
            requests_per_minute,
            ..KeySetSettings::default()
        }
    }

    async fn serve_keys(keys: serde_json::Value) -> (String, HitCounter) {
        let hits = HitCounter::default();
        let counter = hits.clone();
        let app = Router::new().route(
            "/certs",
            get(move || {
                counter.hit();
                let keys = keys.clone();
                async move { Json(keys) }
            }),
        );
        let base = spawn_upstream(app).await;
        (format!("{base}/certs"), hits)
    }

    #[tokio::test]
    async fn miss_fetches_then_hit_is_served_from_cache() {
        let (url, hits) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(url, &settings(10), reqwest::Client::new());

        let first = resolver.resolve(TEST_KID).await.unwrap();
        let second = resolver.resolve(TEST_KID).await.unwrap();

        assert_eq!(first.kid, TEST_KID);
        assert_eq!(first.algorithm, Some(Algorithm::RS256));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hits.count(), 1);
    }

    #[tokio::test]
    async fn one_fetch_stores_every_returned_key() {
        let (url, hits) = serve_keys(test_support::jwks(&[
            (TEST_KID, TEST_RSA_N),
            ("rotated", TEST_RSA_N),
        ]))
        .await;
        let resolver = KeyResolver::new(url, &settings(10), reqwest::Client::new());

        resolver.resolve(TEST_KID).await.unwrap();
        resolver.resolve("rotated").await.unwrap();

        assert_eq!(hits.count(), 1);
        assert_eq!(resolver.cached_key_count(), 2);
    }

    #[tokio::test]
    async fn unknown_kid_is_key_not_found() {
        let (url, _) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(url, &settings(10), reqwest::Client::new());

        let err = resolver.resolve("nope").await.unwrap_err();
        assert_eq!(err, KeyResolveError::KeyNotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn debug_omits_key_material() {
        let (url, _) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(url, &settings(10), reqwest::Client::new());

        let rendered = format!("{:?}", resolver.resolve(TEST_KID).await.unwrap());
        assert!(rendered.contains(TEST_KID));
        assert!(rendered.contains("RS256"));
        assert!(!rendered.contains("decoding_key"));
    }

    #[tokio::test]
    async fn warm_up_leaves_refetch_cap_to_lookups() {
        let (url, hits) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(url, &settings(1), reqwest::Client::new());

        assert_eq!(resolver.warm().await.unwrap(), 1);
        assert_eq!(resolver.warm().await.unwrap(), 1);
        assert_eq!(resolver.cached_key_count(), 1);

        // The single lookup refetch is still available.
        assert!(matches!(
            resolver.resolve("rotated").await,
            Err(KeyResolveError::KeyNotFound(_))
        ));
        assert_eq!(hits.count(), 3);

        // Readiness budget is spent; it does not borrow from lookups.
        assert!(matches!(
            resolver.warm().await,
            Err(KeyResolveError::UpstreamUnavailable(_))
        ));
        assert_eq!(hits.count(), 3);
    }

    #[tokio::test]
    async fn refetch_cap_fails_fast_with_upstream_unavailable() {
        let (url, hits) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(url, &settings(1), reqwest::Client::new());

        assert!(matches!(
            resolver.resolve("unknown-1").await,
            Err(KeyResolveError::KeyNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("unknown-2").await,
            Err(KeyResolveError::UpstreamUnavailable(_))
        ));
        assert_eq!(hits.count(), 1);

        // Already-cached keys keep resolving without a fetch.
        assert!(resolver.resolve(TEST_KID).await.is_ok());
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let (url, hits) = serve_keys(test_support::jwks(&[(TEST_KID, TEST_RSA_N)])).await;
        let resolver = KeyResolver::new(
            url,
            &KeySetSettings {
                ttl: Duration::ZERO,
                ..KeySetSettings::default()
            },
            reqwest::Client::new(),
        );

        resolver.resolve(TEST_KID).await.unwrap();
        resolver.resolve(TEST_KID).await.unwrap();
        assert_eq!(hits.count(), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_keys() {
        let (url, _) = serve_keys(test_support::jwks(&[
            ("k1", TEST_RSA_N),
            ("k2", TEST_RSA_N),
            ("k3", TEST_RSA_N),
        ]))
        .await;
        let resolver = KeyResolver::new(
            url,
            &KeySetSettings {
                max_entries: 2,
                ..KeySetSettings::default()
            },
            reqwest::Client::new(),
        );

        let key = resolver.resolve("k1").await.unwrap();
        assert_eq!(key.kid, "k1");
        assert_eq!(resolver.cached_key_count(), 2);
    }

    #[tokio::test]
    async fn upstream_error_status_is_unavailable() {
        let app = Router::new().route(
            "/certs",
            get(|| async { axum::http::StatusCode::BAD_GATEWAY }),
        );
        let base = spawn_upstream(app).await;
        let resolver = KeyResolver::new(format!("{base}/certs"), &settings(10), reqwest::Client::new());

        assert!(matches!(
            resolver.resolve(TEST_KID).await,
            Err(KeyResolveError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn encryption_keys_are_skipped() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "RSA", "kid": "enc", "use": "enc", "n": TEST_RSA_N, "e": "AQAB"
        }))
        .unwrap();
        assert_eq!(signing_key_from_jwk(&jwk).err(), Some("encryption key"));
    }
}

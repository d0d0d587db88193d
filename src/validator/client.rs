// src/validator/client.rs

use super::model::{JsonWebKeySet, KeyMaterial, SigningKey};
use crate::error::GatekeeperError;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Resolves signing keys by `kid` from the provider's JWKS endpoint.
///
/// Without a cache TTL every lookup re-fetches the key set, so a rotated key
/// is picked up on the very next request. With a TTL, keys are kept in a
/// bounded cache; a miss still goes to the network, and a `kid` the provider
/// does not publish fails closed either way.
#[derive(Clone)]
pub struct KeySetResolver {
    // The resolver is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    jwks_url: Url,
    // `kid` -> `DecodingKey`, only present when caching is enabled.
    key_cache: Option<Cache<String, Arc<DecodingKey>>>,
}

impl KeySetResolver {
    pub fn new(jwks_url: Url, http_client: reqwest::Client, cache_ttl: Option<Duration>) -> Self {
        let key_cache = cache_ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(100) // Max 100 keys, should be more than enough.
                .time_to_live(ttl)
                .build()
        });

        Self {
            inner: Arc::new(Inner {
                http_client,
                jwks_url,
                key_cache,
            }),
        }
    }

    /// Retrieves a decoding key for the given Key ID (`kid`).
    #[instrument(skip(self), err)]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<DecodingKey>, GatekeeperError> {
        if let Some(cache) = &self.inner.key_cache {
            if let Some(key) = cache.get(kid).await {
                debug!("JWK cache hit for kid: {}", kid);
                return Ok(key);
            }
            debug!("JWK cache miss for kid: {}. Fetching from provider.", kid);
        }

        let keys = self.fetch_signing_keys().await?;

        if let Some(cache) = &self.inner.key_cache {
            for key in &keys {
                match decoding_key(key) {
                    Ok(decoding_key) => cache.insert(key.kid.clone(), Arc::new(decoding_key)).await,
                    Err(e) => warn!("Skipping unusable signing key {}: {}", key.kid, e),
                }
            }
            return cache
                .get(kid)
                .await
                .ok_or_else(|| GatekeeperError::UnknownSigningKey(kid.to_string()));
        }

        let key = keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| GatekeeperError::UnknownSigningKey(kid.to_string()))?;
        Ok(Arc::new(decoding_key(key)?))
    }

    /// Drops a cached key, forcing the next lookup for it to hit the network.
    pub async fn invalidate(&self, kid: &str) {
        if let Some(cache) = &self.inner.key_cache {
            cache.invalidate(kid).await;
        }
    }

    /// Fetches the JWKS document and returns the entries usable for signatures.
    #[instrument(skip(self), err)]
    pub async fn fetch_signing_keys(&self) -> Result<Vec<SigningKey>, GatekeeperError> {
        let response = self.inner.http_client.get(self.inner.jwks_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatekeeperError::UnexpectedStatus {
                endpoint: self.inner.jwks_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let jwks: JsonWebKeySet = serde_json::from_slice(&body)?;
        let keys = jwks.signing_keys();
        debug!("Fetched {} keys, {} usable for signatures", jwks.keys.len(), keys.len());
        Ok(keys)
    }
}

fn decoding_key(key: &SigningKey) -> Result<DecodingKey, GatekeeperError> {
    let decoding_key = match &key.material {
        KeyMaterial::Certificate(pem) => DecodingKey::from_rsa_pem(pem.as_bytes())?,
        KeyMaterial::RsaComponents { n, e } => DecodingKey::from_rsa_components(n, e)?,
    };
    Ok(decoding_key)
}

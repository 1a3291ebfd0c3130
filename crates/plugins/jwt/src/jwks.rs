//! Signing key discovery and caching.

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::token::JwtError;

/// Default time keys are trusted before being fetched again.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Refetches closer together than this are skipped, so unknown `kid`s
/// cannot hammer the authority.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    jwks_uri: String,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// JWKS cache backed by OpenID Connect discovery.
pub struct JwksCache {
    discovery_url: Option<String>,
    http: reqwest::Client,
    ttl: Duration,
    state: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    /// Discovers keys from `<authority>/.well-known/openid-configuration`.
    pub fn discover(authority: &str) -> Self {
        Self {
            discovery_url: Some(format!(
                "{}/.well-known/openid-configuration",
                authority.trim_end_matches('/')
            )),
            http: reqwest::Client::new(),
            ttl: DEFAULT_JWKS_TTL,
            state: RwLock::new(None),
        }
    }

    /// Uses a fixed key set that is never refreshed.
    pub fn from_keys(keys: JwkSet) -> Self {
        Self {
            discovery_url: None,
            http: reqwest::Client::new(),
            ttl: DEFAULT_JWKS_TTL,
            state: RwLock::new(Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            })),
        }
    }

    /// Sets how long fetched keys are trusted.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the HTTP client used for discovery.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the discovery document URL, if keys are discovered.
    pub fn discovery_url(&self) -> Option<&str> {
        self.discovery_url.as_deref()
    }

    /// Finds the key for `kid`, refreshing once on a miss or an expired cache.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, JwtError> {
        if let Some(key) = self.lookup(kid, false).await? {
            return Ok(key);
        }

        self.refresh().await?;

        self.lookup(kid, true)
            .await?
            .ok_or_else(|| JwtError::UnknownKey(kid.unwrap_or("<none>").to_string()))
    }

    async fn lookup(&self, kid: Option<&str>, allow_stale: bool) -> Result<Option<DecodingKey>, JwtError> {
        let state = self.state.read().await;
        let Some(cached) = state.as_ref() else {
            return Ok(None);
        };

        let expired = self.discovery_url.is_some() && cached.fetched_at.elapsed() > self.ttl;
        if expired && !allow_stale {
            return Ok(None);
        }

        select_key(&cached.keys, kid)
            .map(|jwk| DecodingKey::from_jwk(jwk).map_err(|e| JwtError::InvalidKey(e.to_string())))
            .transpose()
    }

    async fn refresh(&self) -> Result<(), JwtError> {
        let Some(url) = &self.discovery_url else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        let recent = state
            .as_ref()
            .is_some_and(|c| c.fetched_at.elapsed() < MIN_REFRESH_INTERVAL);
        if recent {
            return Ok(());
        }

        let config: OpenIdConfiguration = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys: JwkSet = self
            .http
            .get(&config.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(
            jwks_uri = %config.jwks_uri,
            keys = keys.keys.len(),
            "Signing keys refreshed"
        );

        *state = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("discovery_url", &self.discovery_url)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// A token without `kid` may only use a set holding exactly one key.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

//! Signing keys of the identity provider

use std::time::Duration;

use dashmap::DashMap;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use reqwest::Client;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

/// How long a fetched key set is trusted before it is fetched again
const JWKS_TTL: Duration = Duration::from_secs(3600);

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Key sets keyed by their URI, refreshed hourly or on an unknown `kid`
pub(crate) struct JwksCache {
    http_client: Client,
    inner: DashMap<String, CachedJwks>,
}

impl JwksCache {
    pub(crate) fn new(http_client: Client) -> Self {
        Self {
            http_client,
            inner: DashMap::new(),
        }
    }

    /// Decoding key for `kid`, refetching the set once if `kid` is unknown
    pub(crate) async fn decoding_key(&self, jwks_uri: &str, kid: &str) -> Result<DecodingKey> {
        let jwks = self.get_or_fetch(jwks_uri, false).await?;
        if let Some(key) = find_key(&jwks, kid) {
            return Ok(key);
        }

        debug!(kid = %kid, "Signing key not in cached set, refreshing");
        let jwks = self.get_or_fetch(jwks_uri, true).await?;
        find_key(&jwks, kid).ok_or_else(|| Error::Identity(format!("Unknown signing key: {kid}")))
    }

    async fn get_or_fetch(&self, jwks_uri: &str, force_refresh: bool) -> Result<JwkSet> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(uri = %jwks_uri, "Fetching identity provider signing keys");
        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| Error::Identity(format!("Signing key request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Identity(format!(
                "Signing key request returned HTTP {}",
                response.status()
            )));
        }
        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("Malformed signing key set: {e}")))?;

        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(keys)
    }
}

/// Public key with id `kid`; symmetric keys are never accepted
fn find_key(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    let jwk = jwks
        .keys
        .iter()
        .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))?;

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y).ok(),
        AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
    }
}

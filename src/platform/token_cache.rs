//! Shared access token cache with single-flight refresh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::EXPIRY_MARGIN;
use crate::Result;

/// A freshly issued service access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenGrant {
    /// Bearer token value
    pub access_token: String,
    /// Lifetime reported by the token endpoint
    pub expires_in: Duration,
}

/// Where the cache gets new tokens from
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Request a new access token for `scope`
    async fn fetch_token(&self, scope: &str) -> Result<AccessTokenGrant>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    scope: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_usable(&self, scope: &str, now: Instant) -> bool {
        self.scope == scope && self.expires_at > now + EXPIRY_MARGIN
    }
}

/// Process-wide access token, refreshed on demand.
///
/// The lock covers both the freshness check and the refresh, so callers
/// that arrive while a refresh is in flight wait for it and reuse its
/// result instead of issuing their own request.
pub struct AccessTokenCache {
    source: Arc<dyn TokenSource>,
    current: Mutex<Option<CachedToken>>,
}

impl AccessTokenCache {
    /// Create an empty cache backed by `source`
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: Mutex::new(None),
        }
    }

    /// Return a token with more than [`EXPIRY_MARGIN`] left, fetching one if needed.
    ///
    /// Fetch failures propagate unchanged and leave the cache as it was;
    /// nothing is retried here.
    pub async fn get(&self, scope: &str) -> Result<String> {
        let mut current = self.current.lock().await;
        let requested_at = Instant::now();

        if let Some(token) = current
            .as_ref()
            .filter(|t| t.is_usable(scope, requested_at))
        {
            debug!("Reusing cached platform access token");
            return Ok(token.value.clone());
        }

        let grant = self.source.fetch_token(scope).await?;
        info!(
            scope = %scope,
            expires_in_secs = grant.expires_in.as_secs(),
            "Obtained platform access token"
        );

        // Expiry counts from before the request went out
        let token = CachedToken {
            value: grant.access_token,
            scope: scope.to_string(),
            expires_at: requested_at + grant.expires_in,
        };
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next [`get`](Self::get) fetches a new one
    pub async fn invalidate(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("Platform access token invalidated");
        }
    }

    /// Drop the cached token only if it is still `rejected`.
    ///
    /// A caller holding an older token must not discard one that another
    /// request already refreshed. Returns whether the token was dropped.
    pub async fn invalidate_if(&self, rejected: &str) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|t| t.value == rejected) {
            *current = None;
            debug!("Rejected platform access token invalidated");
            true
        } else {
            false
        }
    }

    /// Time left on the cached token, if any
    pub async fn time_until_expiry(&self) -> Option<Duration> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .map(|t| t.expires_at.saturating_duration_since(Instant::now()))
    }
}

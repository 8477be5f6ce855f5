//! HTTP calls against the Domo API

use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::token_cache::{AccessTokenGrant, TokenSource};
use super::DEFAULT_EXPIRES_IN;
use crate::config::PlatformConfig;
use crate::{Error, Result};

/// Permissions granted on every embed token
pub const EMBED_PERMISSIONS: [&str; 3] = ["READ", "FILTER", "EXPORT"];

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Embed auth request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedAuthRequest<'a> {
    session_length: u64,
    authorizations: [EmbedAuthorization<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedAuthorization<'a> {
    token: &'a str,
    permissions: [&'static str; 3],
    filters: [serde_json::Value; 0],
}

/// Embed auth response
#[derive(Debug, Deserialize)]
struct EmbedAuthResponse {
    authentication: Option<String>,
}

/// User to provision on the platform
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlatformUser {
    /// Login email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Platform role name
    pub role: String,
}

impl NewPlatformUser {
    /// A `Participant` user with empty names
    pub fn participant(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            role: "Participant".to_string(),
        }
    }
}

/// Client for the analytics platform API
#[derive(Clone)]
pub struct PlatformClient {
    /// HTTP client (carries the request timeout)
    http_client: Client,
    /// API base URL without trailing slash
    api_host: String,
    client_id: String,
    client_secret: String,
    /// Embed resource kind (`cards` / `pages`)
    card_target: String,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("api_host", &self.api_host)
            .field("client_id", &self.client_id)
            .field("card_target", &self.card_target)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    /// Build a client with its own HTTP connection pool
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self::with_http_client(http_client, config))
    }

    /// Build a client around an existing HTTP client
    #[must_use]
    pub fn with_http_client(http_client: Client, config: &PlatformConfig) -> Self {
        Self {
            http_client,
            api_host: config.api_host.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            card_target: config.card_target.clone(),
        }
    }

    /// Client-credentials grant against `{api_host}/oauth/token`
    pub async fn request_access_token(&self, scope: &str) -> Result<AccessTokenGrant> {
        let url = format!("{}/oauth/token", self.api_host);
        debug!(url = %url, scope = %scope, "Requesting platform access token");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials"), ("scope", scope)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("oauth/token", response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessTokenGrant {
            access_token: token.access_token,
            expires_in: token
                .expires_in
                .map_or(DEFAULT_EXPIRES_IN, std::time::Duration::from_secs),
        })
    }

    /// Mint an embed token for one card or page.
    ///
    /// Returns `Ok(None)` when the platform answers successfully but without
    /// an `authentication` field; callers decide whether that is fatal.
    pub async fn create_embed_token(
        &self,
        access_token: &str,
        embed_id: &str,
        session_minutes: u32,
    ) -> Result<Option<String>> {
        if embed_id.is_empty() {
            return Err(Error::InvalidArgument("embed_id is required".to_string()));
        }

        let url = self.embed_auth_url();
        let body = EmbedAuthRequest {
            session_length: u64::from(session_minutes) * 60,
            authorizations: [EmbedAuthorization {
                token: embed_id,
                permissions: EMBED_PERMISSIONS,
                filters: [],
            }],
        };
        debug!(url = %url, embed_id = %embed_id, "Requesting embed token");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("embed/auth", response).await);
        }

        let auth: EmbedAuthResponse = response.json().await?;
        Ok(auth.authentication)
    }

    /// Provision a user through `POST {api_host}/v1/users`
    pub async fn create_user(
        &self,
        access_token: &str,
        user: &NewPlatformUser,
    ) -> Result<serde_json::Value> {
        if user.email.is_empty() {
            return Err(Error::InvalidArgument("email is required".to_string()));
        }

        let response = self
            .http_client
            .post(format!("{}/v1/users", self.api_host))
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .json(user)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("users", response).await);
        }

        Ok(response.json().await?)
    }

    fn embed_auth_url(&self) -> String {
        format!("{}/v1/{}/embed/auth", self.api_host, self.card_target)
    }
}

#[async_trait]
impl TokenSource for PlatformClient {
    async fn fetch_token(&self, scope: &str) -> Result<AccessTokenGrant> {
        self.request_access_token(scope).await
    }
}

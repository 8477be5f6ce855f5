//! Authorization-code client for the Microsoft identity platform

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::AuthenticatedUser;
use super::jwks::JwksCache;
use crate::config::IdentityConfig;
use crate::{Error, Result};

/// Scopes always requested alongside the configured ones
const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Tenant aliases whose tokens are issued by the user's home tenant
const MULTI_TENANT_ALIASES: [&str; 3] = ["common", "organizations", "consumers"];

/// Clock skew tolerated on `exp`
const CLOCK_LEEWAY_SECS: u64 = 60;

/// Token endpoint response (only the fields we read)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// OAuth error body
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Confidential client for one tenant
#[derive(Clone)]
pub struct IdentityClient {
    http_client: Client,
    client_id: String,
    client_secret: String,
    /// `{authority_host}/{tenant_id}`
    authority: String,
    /// Expected `iss`; `None` for multi-tenant aliases
    issuer: Option<String>,
    scopes: Vec<String>,
    jwks: Arc<JwksCache>,
}

impl IdentityClient {
    /// Create a client from configuration
    #[must_use]
    pub fn new(http_client: Client, config: &IdentityConfig) -> Self {
        let authority = format!(
            "{}/{}",
            config.authority_host.trim_end_matches('/'),
            config.tenant_id
        );
        let issuer = (!MULTI_TENANT_ALIASES.contains(&config.tenant_id.as_str()))
            .then(|| format!("{authority}/v2.0"));

        Self {
            jwks: Arc::new(JwksCache::new(http_client.clone())),
            http_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authority,
            issuer,
            scopes: config.scopes.clone(),
        }
    }

    /// Authority URL for the tenant
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Issuer that ID tokens must carry, if pinned
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Where the tenant publishes its signing keys
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        format!("{}/discovery/v2.0/keys", self.authority)
    }

    /// URL to send the browser to for sign-in
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/oauth2/v2.0/authorize", self.authority))
            .map_err(|e| Error::Identity(format!("Invalid authority: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scope_param())
            .append_pair("state", state);

        Ok(url.into())
    }

    /// Exchange an authorization code for the user's verified ID token claims
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<AuthenticatedUser> {
        let scope = self.scope_param();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(format!("{}/oauth2/v2.0/token", self.authority))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Identity(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => format!("HTTP {status} - {body}"),
            };
            warn!(status = %status, "Authorization code exchange rejected");
            return Err(Error::Identity(detail));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("Failed to parse token response: {e}")))?;
        let id_token = token
            .id_token
            .ok_or_else(|| Error::Identity("No id_token in token response".to_string()))?;

        let user = self.verify_id_token(&id_token).await?;
        info!(user = user.preferred_username().unwrap_or("<unknown>"), "User signed in");
        Ok(user)
    }

    /// Check an ID token's signature against the tenant keys, then its
    /// `exp`, `aud` (this client) and `iss` (this tenant) claims
    pub async fn verify_id_token(&self, id_token: &str) -> Result<AuthenticatedUser> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| Error::Identity(format!("Malformed id_token: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| Error::Identity("id_token header has no kid".to_string()))?;

        let validation = self.validation(header.alg)?;
        let key = self.jwks.decoding_key(&self.jwks_uri(), &kid).await?;

        let data = jsonwebtoken::decode::<Map<String, Value>>(id_token, &key, &validation)
            .map_err(|e| Error::Identity(format!("Invalid id_token: {e}")))?;
        debug!(kid = %kid, "Verified id_token");
        Ok(AuthenticatedUser::from_claims(data.claims))
    }

    /// Provider sign-out URL that returns the browser to `post_logout_redirect`
    pub fn logout_url(&self, post_logout_redirect: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/oauth2/v2.0/logout", self.authority))
            .map_err(|e| Error::Identity(format!("Invalid authority: {e}")))?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", post_logout_redirect);
        Ok(url.into())
    }

    /// Claim checks for ID tokens signed with `alg`
    fn validation(&self, alg: Algorithm) -> Result<Validation> {
        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::ES256
            | Algorithm::ES384 => {}
            other => {
                return Err(Error::Identity(format!(
                    "Unsupported id_token algorithm: {other:?}"
                )));
            }
        }

        let mut validation = Validation::new(alg);
        validation.leeway = CLOCK_LEEWAY_SECS;
        validation.set_audience(&[&self.client_id]);
        match &self.issuer {
            Some(issuer) => {
                validation.set_issuer(&[issuer]);
                validation.set_required_spec_claims(&["exp", "aud", "iss"]);
            }
            None => validation.set_required_spec_claims(&["exp", "aud"]),
        }
        Ok(validation)
    }

    fn scope_param(&self) -> String {
        let mut scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        for scope in OIDC_SCOPES {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes.join(" ")
    }
}

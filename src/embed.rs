//! Embed configuration for a signed-in user
//!
//! Resolves the user's embed ids from the directory, obtains one shared
//! access token and mints one embed token per id.

use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlatformConfig;
use crate::directory::EmbedDirectory;
use crate::identity::AuthenticatedUser;
use crate::platform::{AccessTokenCache, PlatformClient, TokenSource};
use crate::{Error, Result};

/// A minted embed token for one embed id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedToken {
    /// Card or page id
    pub embed_id: String,
    /// Token the browser posts to the embed host
    pub token: String,
}

/// Everything a page needs to render the user's embeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfiguration {
    /// One token per embed id, in directory order
    pub embeds: Vec<EmbedToken>,
    /// Host serving the embedded content
    pub embed_host: String,
}

/// Ties the directory, the access token cache and the platform client together
pub struct EmbedService {
    directory: Arc<EmbedDirectory>,
    platform: PlatformClient,
    access_tokens: AccessTokenCache,
    embed_host: String,
    scope: String,
    session_minutes: u32,
}

impl EmbedService {
    /// Build the service with a fresh platform client
    pub fn new(config: &PlatformConfig, directory: Arc<EmbedDirectory>) -> Result<Self> {
        Ok(Self::with_client(
            PlatformClient::new(config)?,
            config,
            directory,
        ))
    }

    /// Build the service around an existing platform client
    #[must_use]
    pub fn with_client(
        platform: PlatformClient,
        config: &PlatformConfig,
        directory: Arc<EmbedDirectory>,
    ) -> Self {
        let source: Arc<dyn TokenSource> = Arc::new(platform.clone());
        Self {
            directory,
            platform,
            access_tokens: AccessTokenCache::new(source),
            embed_host: config.embed_host.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
            session_minutes: config.session_minutes,
        }
    }

    /// The user directory
    #[must_use]
    pub fn directory(&self) -> &EmbedDirectory {
        &self.directory
    }

    /// The platform client
    #[must_use]
    pub fn platform(&self) -> &PlatformClient {
        &self.platform
    }

    /// The shared access token cache
    #[must_use]
    pub fn access_tokens(&self) -> &AccessTokenCache {
        &self.access_tokens
    }

    /// Host serving embedded content
    #[must_use]
    pub fn embed_host(&self) -> &str {
        &self.embed_host
    }

    /// Service access token for the configured scope
    pub async fn get_access_token(&self) -> Result<String> {
        self.access_tokens.get(&self.scope).await
    }

    /// Embed ids the user may view, in directory order
    #[must_use]
    pub fn embed_ids_for_user(&self, user: Option<&AuthenticatedUser>) -> Vec<String> {
        self.directory.embed_ids_for_user(user)
    }

    /// Mint embed tokens for every embed the user may view.
    ///
    /// `Ok(None)` means nothing is configured for the user. Any failed or
    /// empty mint fails the whole call; partial lists are never returned.
    pub async fn get_embed_configuration(
        &self,
        user: Option<&AuthenticatedUser>,
    ) -> Result<Option<EmbedConfiguration>> {
        let embed_ids = self.embed_ids_for_user(user);
        if embed_ids.is_empty() {
            debug!(
                user = user.and_then(AuthenticatedUser::preferred_username),
                "No embeds configured"
            );
            return Ok(None);
        }

        let access_token = self.get_access_token().await?;
        let embeds = try_join_all(
            embed_ids
                .iter()
                .map(|embed_id| self.mint(&access_token, embed_id)),
        )
        .await?;

        info!(
            user = user.and_then(AuthenticatedUser::preferred_username),
            count = embeds.len(),
            "Minted embed tokens"
        );
        Ok(Some(EmbedConfiguration {
            embeds,
            embed_host: self.embed_host.clone(),
        }))
    }

    async fn mint(&self, access_token: &str, embed_id: &str) -> Result<EmbedToken> {
        match self
            .platform
            .create_embed_token(access_token, embed_id, self.session_minutes)
            .await
        {
            Ok(Some(token)) => Ok(EmbedToken {
                embed_id: embed_id.to_string(),
                token,
            }),
            Ok(None) => Err(Error::MissingEmbedToken(embed_id.to_string())),
            Err(e) => {
                if matches!(&e, Error::Upstream { status, .. } if *status == StatusCode::UNAUTHORIZED)
                {
                    // Revoked before expiry: make the next request fetch a new one
                    self.access_tokens.invalidate_if(access_token).await;
                }
                warn!(embed_id = %embed_id, error = %e, "Embed token request failed");
                Err(e)
            }
        }
    }
}

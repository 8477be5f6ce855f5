//! Domo analytics platform client
//!
//! Two concerns live here:
//! - a service-level access token obtained with the client-credentials
//!   grant and shared by every request through [`AccessTokenCache`]
//! - per-request embed tokens minted by [`PlatformClient::create_embed_token`]

mod client;
mod token_cache;

use std::time::Duration;

pub use client::{EMBED_PERMISSIONS, NewPlatformUser, PlatformClient};
pub use token_cache::{AccessTokenCache, AccessTokenGrant, TokenSource};

/// Scope requested when the caller has no specific need
pub const DEFAULT_SCOPE: &str = "data user dashboard";

/// A cached token is only reused while it has more than this left
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(5);

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(300);

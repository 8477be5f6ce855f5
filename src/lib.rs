//! hubsync
//!
//! Identity-gated gateway for embedded Domo dashboards.
//!
//! # Features
//!
//! - **Sign-in**: Microsoft identity platform authorization-code flow with
//!   server-side sessions
//! - **Directory**: static email-to-embed mapping loaded at startup
//! - **Token cache**: one shared platform access token with single-flight refresh
//! - **Embed tokens**: per-request, per-embed tokens with read/filter/export rights
//! - **HTTP surface**: embed viewer page and JSON token API

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod directory;
pub mod embed;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod platform;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
    }

    Ok(())
}

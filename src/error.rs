//! Error types for hubsync

use std::io;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for hubsync
pub type Result<T> = std::result::Result<T, Error>;

/// hubsync errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed an argument that can never succeed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The analytics platform answered with a non-success status
    #[error("Upstream {endpoint} returned HTTP {status}: {body}")]
    Upstream {
        /// Which platform endpoint failed
        endpoint: &'static str,
        /// Response status
        status: StatusCode,
        /// Response body (possibly empty)
        body: String,
    },

    /// The platform accepted the embed request but returned no token
    #[error("Domo did not return an embed token for {0}")]
    MissingEmbedToken(String),

    /// Identity provider handshake failed
    #[error("Identity provider error: {0}")]
    Identity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::Upstream`] from a failed response, draining its body
    pub(crate) async fn upstream(endpoint: &'static str, response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Upstream {
            endpoint,
            status,
            body,
        }
    }

    /// Message for the browser; upstream response bodies stay in the logs
    #[must_use]
    pub fn public_detail(&self) -> String {
        match self {
            Self::Upstream {
                endpoint, status, ..
            } => format!("Upstream {endpoint} returned HTTP {status}"),
            other => other.to_string(),
        }
    }

    /// Short machine-readable code used in JSON error bodies
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Upstream { .. } => "upstream_status",
            Self::MissingEmbedToken(_) => "missing_embed_token",
            Self::Identity(_) => "identity",
            Self::Http(e) if e.is_timeout() => "upstream_timeout",
            Self::Http(_) => "upstream_unreachable",
            Self::Io(_) => "io",
            Self::Json(_) => "malformed_response",
            Self::Internal(_) => "internal",
        }
    }
}

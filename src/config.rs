//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Flat environment names understood for compatibility with existing
/// deployments, mapped onto their nested configuration keys.
const FLAT_ENV_KEYS: &[(&str, &str)] = &[
    ("DOMO_API_HOST", "platform.api_host"),
    ("DOMO_EMBED_HOST", "platform.embed_host"),
    ("DOMO_CLIENT_ID", "platform.client_id"),
    ("DOMO_CLIENT_SECRET", "platform.client_secret"),
    ("C_D", "platform.card_target"),
    ("CLIENT_ID", "identity.client_id"),
    ("CLIENT_SECRET", "identity.client_secret"),
    ("TENANT_ID", "identity.tenant_id"),
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Analytics platform (Domo) configuration
    pub platform: PlatformConfig,
    /// Identity provider configuration
    pub identity: IdentityConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// User-to-embed directory configuration
    pub directory: DirectoryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL, used to build the login redirect URI.
    /// Derived from the request `Host` header when unset.
    pub public_url: Option<String>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            public_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Analytics platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// API base URL
    pub api_host: String,
    /// Host the browser posts embed tokens to
    pub embed_host: String,
    /// Client-credentials id
    pub client_id: String,
    /// Client-credentials secret (supports `${VAR}`)
    pub client_secret: String,
    /// Embed resource kind in the auth path (`cards` or `pages`)
    pub card_target: String,
    /// Scope requested for the service access token
    pub scope: String,
    /// Lifetime requested for each embed session, in minutes
    pub session_minutes: u32,
    /// Timeout for every outbound platform call
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_host: "https://api.domo.com".to_string(),
            embed_host: "https://public.domo.com".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            card_target: "cards".to_string(),
            scope: crate::platform::DEFAULT_SCOPE.to_string(),
            session_minutes: 60,
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Identity provider (Microsoft identity platform) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Application (client) id
    pub client_id: String,
    /// Client secret (supports `${VAR}`)
    pub client_secret: String,
    /// Directory (tenant) id
    pub tenant_id: String,
    /// Scopes requested in addition to the OpenID ones
    pub scopes: Vec<String>,
    /// Path of the authorization-code callback route
    pub redirect_path: String,
    /// Login host; the authority is `{authority_host}/{tenant_id}`
    pub authority_host: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            tenant_id: String::new(),
            scopes: vec!["User.Read".to_string()],
            redirect_path: "/getAToken".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id
    pub cookie_name: String,
    /// Idle lifetime of a server-side session
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Mark the cookie `Secure`
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "hubsync_session".to_string(),
            ttl: Duration::from_secs(8 * 3600),
            secure_cookies: false,
        }
    }
}

/// User-to-embed directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON file with `[{email, embed_id}]` records
    pub path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: "domo.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Precedence, lowest first: defaults, YAML file, flat legacy
    /// variables (`DOMO_API_HOST`, ...), `HUBSYNC_` prefixed variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment
            .merge(flat_env())
            .merge(Env::prefixed("HUBSYNC_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();

        Ok(config)
    }

    /// Check that the settings needed to serve requests are present
    pub fn validate(&self) -> Result<()> {
        if self.platform.client_id.is_empty() || self.platform.client_secret.is_empty() {
            return Err(Error::Config(
                "platform.client_id and platform.client_secret are required \
                 (DOMO_CLIENT_ID / DOMO_CLIENT_SECRET)"
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("platform.api_host", &self.platform.api_host),
            ("platform.embed_host", &self.platform.embed_host),
            ("identity.authority_host", &self.identity.authority_host),
        ] {
            Url::parse(value).map_err(|e| Error::Config(format!("{name}: {e}")))?;
        }
        if self.platform.card_target.is_empty() {
            return Err(Error::Config("platform.card_target must not be empty".to_string()));
        }
        if self.platform.session_minutes == 0 {
            return Err(Error::Config(
                "platform.session_minutes must be at least 1".to_string(),
            ));
        }
        if !self.identity.redirect_path.starts_with('/') {
            return Err(Error::Config(
                "identity.redirect_path must start with '/'".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the identity provider has enough settings to run a login
    #[must_use]
    pub fn identity_configured(&self) -> bool {
        !self.identity.client_id.is_empty() && !self.identity.tenant_id.is_empty()
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in credential values
    fn expand_env_vars(&mut self) {
        let re = env_pattern();

        for value in [
            &mut self.platform.client_id,
            &mut self.platform.client_secret,
            &mut self.identity.client_id,
            &mut self.identity.client_secret,
            &mut self.identity.tenant_id,
        ] {
            *value = Self::expand_string(&re, value);
        }
        self.directory.path = Self::expand_string(&re, &self.directory.path);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Pattern: ${VAR} or ${VAR:-default}
fn env_pattern() -> Regex {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static regex")
}

/// Provider for the flat variable names in [`FLAT_ENV_KEYS`]
fn flat_env() -> Env {
    Env::raw().filter_map(|key| {
        FLAT_ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.platform.client_id = "id".to_string();
        config.platform.client_secret = "secret".to_string();
        config
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.platform.api_host, "https://api.domo.com");
        assert_eq!(config.platform.embed_host, "https://public.domo.com");
        assert_eq!(config.platform.card_target, "cards");
        assert_eq!(config.platform.scope, "data user dashboard");
        assert_eq!(config.platform.session_minutes, 60);
        assert_eq!(config.platform.http_timeout, Duration::from_secs(10));
        assert_eq!(config.identity.redirect_path, "/getAToken");
        assert_eq!(config.identity.scopes, vec!["User.Read".to_string()]);
        assert_eq!(config.directory.path, "domo.json");
    }

    #[test]
    fn load_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  port: 8088
platform:
  api_host: "http://127.0.0.1:9999"
  card_target: pages
  http_timeout: 3s
directory:
  path: users.json
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.platform.api_host, "http://127.0.0.1:9999");
        assert_eq!(config.platform.card_target, "pages");
        assert_eq!(config.platform.http_timeout, Duration::from_secs(3));
        assert_eq!(config.directory.path, "users.json");
        // Untouched sections keep their defaults
        assert_eq!(config.platform.embed_host, "https://public.domo.com");
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/hubsync.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("not found")));
    }

    #[test]
    fn expand_string_uses_default_for_unset_variable() {
        let re = env_pattern();
        let expanded =
            Config::expand_string(&re, "${HUBSYNC_TEST_SURELY_UNSET_VAR:-fallback}");
        assert_eq!(expanded, "fallback");
        assert_eq!(Config::expand_string(&re, "literal"), "literal");
    }

    #[test]
    fn validate_requires_platform_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_urls_and_zero_session() {
        let mut config = valid_config();
        config.platform.api_host = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.platform.session_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.identity.redirect_path = "getAToken".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn identity_configured_needs_client_and_tenant() {
        let mut config = Config::default();
        assert!(!config.identity_configured());
        config.identity.client_id = "app".to_string();
        config.identity.tenant_id = "tenant".to_string();
        assert!(config.identity_configured());
    }
}

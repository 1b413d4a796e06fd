//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override), including a `.env` file

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public URL the browser uses to reach the server
    /// e.g., "http://localhost:3000"
    pub public_url: String,
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// GitHub OAuth application configuration
///
/// Endpoint URLs are configurable so tests can point them at a local stub.
#[derive(Clone, Deserialize)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback registered with the GitHub OAuth app
    pub redirect_url: String,
    /// Requested scopes (default: ["user"])
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub device_authorization_url: String,
    /// REST API base (default: "https://api.github.com")
    pub api_base_url: String,
    /// Timeout for every outbound call to GitHub
    pub request_timeout_seconds: u64,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("device_authorization_url", &self.device_authorization_url)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Session configuration
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// Cookie signing key (32+ bytes). A random key is generated when unset.
    pub session_secret: Option<String>,
    /// Session idle lifetime in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// Upper bound on live sessions held in memory
    pub max_sessions: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "session_secret",
                &self.session_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("session_max_age", &self.session_max_age)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (GITHUB_LOGIN__*)
    /// 5. EXAMPLE_CLIENT_ID / EXAMPLE_CLIENT_SECRET, if set
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.public_url", "http://localhost:3000")?
            .set_default("github.client_id", "")?
            .set_default("github.client_secret", "")?
            .set_default(
                "github.redirect_url",
                "http://localhost:3000/oauth2/callback",
            )?
            .set_default("github.scopes", vec!["user"])?
            .set_default(
                "github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default(
                "github.device_authorization_url",
                "https://github.com/login/device/code",
            )?
            .set_default("github.api_base_url", "https://api.github.com")?
            .set_default("github.request_timeout_seconds", 10)?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.max_sessions", 10_000)?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (GITHUB_LOGIN__*)
            .add_source(
                Environment::with_prefix("GITHUB_LOGIN")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("github.scopes")
                    .try_parsing(true),
            )
            .set_override_option("github.client_id", std::env::var("EXAMPLE_CLIENT_ID").ok())?
            .set_override_option(
                "github.client_secret",
                std::env::var("EXAMPLE_CLIENT_SECRET").ok(),
            )?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        url::Url::parse(&self.server.public_url)
            .map(|url| url.scheme() == "https")
            .unwrap_or(false)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        const MIN_SESSION_SECRET_BYTES: usize = 32;
        const MAX_SESSION_MAX_AGE_SECONDS: i64 = 365 * 24 * 60 * 60;

        if self.github.client_id.trim().is_empty() {
            return Err(AppError::Config(
                "github.client_id must be set (GITHUB_LOGIN__GITHUB__CLIENT_ID or EXAMPLE_CLIENT_ID)"
                    .to_string(),
            ));
        }

        if self.github.client_secret.trim().is_empty() {
            return Err(AppError::Config(
                "github.client_secret must be set (GITHUB_LOGIN__GITHUB__CLIENT_SECRET or EXAMPLE_CLIENT_SECRET)"
                    .to_string(),
            ));
        }

        for (key, value) in [
            ("github.redirect_url", &self.github.redirect_url),
            ("github.authorize_url", &self.github.authorize_url),
            ("github.token_url", &self.github.token_url),
            (
                "github.device_authorization_url",
                &self.github.device_authorization_url,
            ),
            ("github.api_base_url", &self.github.api_base_url),
            ("server.public_url", &self.server.public_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))?;
        }

        if let Some(secret) = &self.auth.session_secret {
            if secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
                return Err(AppError::Config(format!(
                    "auth.session_secret must be at least {} bytes",
                    MIN_SESSION_SECRET_BYTES
                )));
            }
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }
        if self.auth.session_max_age > MAX_SESSION_MAX_AGE_SECONDS {
            return Err(AppError::Config(format!(
                "auth.session_max_age must be at most {} seconds",
                MAX_SESSION_MAX_AGE_SECONDS
            )));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.public_url);
            if !is_local_server_host(&host) {
                return Err(AppError::Config(
                    "server.public_url must be https for non-local hosts".to_string(),
                ));
            }
            tracing::warn!(
                host = %host,
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}

fn normalized_server_host(public_url: &str) -> String {
    let trimmed = public_url.trim();
    let host = url::Url::parse(trimmed)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

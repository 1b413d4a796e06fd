//! github-login - A minimal "login with GitHub" OAuth2 web server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Landing page (login or profile view)                     │
//! │  - OAuth redirect / callback / logout                       │
//! │  - Request logging, metrics                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - OAuth code + refresh exchange (oauth2)                   │
//! │  - GitHub REST profile fetch (reqwest)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Session Store                            │
//! │  - In-memory, keyed by signed cookie                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: Landing page, logging middleware, metrics endpoint
//! - `auth`: GitHub OAuth flow and sessions
//! - `service`: GitHub client
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// GitHub OAuth + REST client
    pub github: Arc<service::GitHubClient>,

    /// Browser sessions (volatile)
    pub sessions: Arc<auth::SessionStore>,

    /// Page templates
    pub pages: Arc<api::PageRenderer>,

    /// Key used to sign session cookies
    pub session_secret: Arc<str>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Resolve the session signing key
    /// 2. Build the outbound HTTP client and GitHub client
    /// 3. Create the session store
    /// 4. Load page templates
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Session signing key
        let session_secret = match &config.auth.session_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!(
                    "auth.session_secret not set; generated an ephemeral key, sessions end on restart"
                );
                auth::session::generate_session_secret()
            }
        };

        // 2. HTTP client for GitHub (token endpoints require redirects disabled)
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("github-login/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.github.request_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github = service::GitHubClient::new(&config.github, http_client)
            .map_err(|e| error::AppError::Config(e.to_string()))?;

        // 3. Session store
        let idle = Duration::from_secs(config.auth.session_max_age.unsigned_abs());
        let sessions = auth::SessionStore::new(config.auth.max_sessions, idle);

        // 4. Templates
        let pages = api::PageRenderer::new()?;

        tracing::info!(
            client_id = %config.github.client_id,
            redirect_url = %config.github.redirect_url,
            scopes = ?config.github.scopes,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            github: Arc::new(github),
            sessions: Arc::new(sessions),
            pages: Arc::new(pages),
            session_secret: Arc::from(session_secret),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware, routing::get};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    Router::new()
        .route("/", get(api::root))
        .route("/health", get(health_check))
        .merge(auth::auth_router())
        .merge(api::metrics_router())
        .route_layer(middleware::from_fn(api::log_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

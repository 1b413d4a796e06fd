//! GitHub service
//!
//! Wraps the `oauth2` client for the authorization-code flow (with PKCE)
//! and refresh-token exchange, and fetches the authenticated user's profile
//! from the REST API.

use std::time::Instant;

use chrono::{DateTime, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AccessToken, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    DeviceAuthorizationUrl, EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GitHubConfig;
use crate::metrics::{GITHUB_API_DURATION_SECONDS, GITHUB_API_REQUESTS_TOTAL, OAUTH_EXCHANGES_TOTAL};

/// GitHub OAuth app client with authorize, device and token endpoints set
type GitHubOAuthClient =
    BasicClient<EndpointSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] oauth2::url::ParseError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("OAuth token exchange failed: {0}")]
    TokenExchange(String),

    #[error("GitHub API returned {status} for {endpoint}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("Failed to decode GitHub user profile: {0}")]
    ProfileDecode(#[from] serde_json::Error),
}

/// Authenticated GitHub user
///
/// GitHub sends `id`; `Id` is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "Id")]
    pub id: u64,
    pub login: String,
}

/// Everything needed to send the browser to GitHub and verify its return
pub struct AuthorizationStart {
    pub url: String,
    pub csrf_state: CsrfToken,
    pub pkce_verifier: PkceCodeVerifier,
}

/// Token set returned by a code or refresh exchange
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenGrant {
    fn from_response(response: &BasicTokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);

        // GitHub separates granted scopes with commas rather than spaces.
        let scopes = response
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .flat_map(|scope| scope.split(','))
                    .map(str::trim)
                    .filter(|scope| !scope.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            access_token: response.access_token().clone(),
            refresh_token: response.refresh_token().cloned(),
            expires_at,
            scopes,
        }
    }
}

/// GitHub client
///
/// Holds the OAuth client configuration and a shared HTTP client. The HTTP
/// client must not follow redirects; token endpoints are called through it.
#[derive(Clone)]
pub struct GitHubClient {
    oauth: GitHubOAuthClient,
    http: reqwest::Client,
    api_base_url: String,
    scopes: Vec<Scope>,
}

impl GitHubClient {
    /// Create new GitHub client
    ///
    /// # Errors
    /// Returns error if any configured endpoint is not a valid URL
    pub fn new(config: &GitHubConfig, http: reqwest::Client) -> Result<Self, GitHubError> {
        let oauth = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.authorize_url.clone())?)
            .set_device_authorization_url(DeviceAuthorizationUrl::new(
                config.device_authorization_url.clone(),
            )?)
            .set_token_uri(TokenUrl::new(config.token_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?)
            .set_auth_type(AuthType::RequestBody);

        Ok(Self {
            oauth,
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            scopes: config.scopes.iter().cloned().map(Scope::new).collect(),
        })
    }

    /// Build the GitHub authorize URL with a fresh CSRF state and PKCE challenge
    pub fn authorization_start(&self) -> AuthorizationStart {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationStart {
            url: url.to_string(),
            csrf_state,
            pkce_verifier,
        }
    }

    /// Exchange an authorization code for a token set
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<TokenGrant, GitHubError> {
        let result = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await;

        self.finish_exchange("authorization_code", result)
    }

    /// Exchange a refresh token for a new token set
    pub async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenGrant, GitHubError> {
        let result = self
            .oauth
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http)
            .await;

        self.finish_exchange("refresh_token", result)
    }

    fn finish_exchange<RE>(
        &self,
        grant: &'static str,
        result: Result<BasicTokenResponse, RequestTokenError<RE, BasicErrorResponse>>,
    ) -> Result<TokenGrant, GitHubError>
    where
        RE: std::error::Error + 'static,
    {
        match result {
            Ok(response) => {
                OAUTH_EXCHANGES_TOTAL
                    .with_label_values(&[grant, "success"])
                    .inc();
                let token = TokenGrant::from_response(&response, Utc::now());
                tracing::info!(
                    grant,
                    token_type = ?response.token_type(),
                    expires_at = ?token.expires_at,
                    scopes = ?token.scopes,
                    "Completed OAuth exchange"
                );
                Ok(token)
            }
            Err(error) => {
                OAUTH_EXCHANGES_TOTAL
                    .with_label_values(&[grant, "failure"])
                    .inc();
                let message = match &error {
                    RequestTokenError::ServerResponse(response) => {
                        match response.error_description() {
                            Some(description) => format!("{}: {}", response.error(), description),
                            None => response.error().to_string(),
                        }
                    }
                    RequestTokenError::Parse(_, body) => match std::str::from_utf8(body) {
                        Ok(body) => format!("unexpected token response: {body}"),
                        Err(_) => "unexpected non-UTF8 token response".to_string(),
                    },
                    other => other.to_string(),
                };
                Err(GitHubError::TokenExchange(message))
            }
        }
    }

    /// Fetch the profile of the user the access token belongs to
    ///
    /// `GET {api_base_url}/user` with Bearer authentication.
    pub async fn fetch_user(&self, access_token: &AccessToken) -> Result<UserProfile, GitHubError> {
        let started = Instant::now();
        let result = self.fetch_user_inner(access_token).await;

        GITHUB_API_DURATION_SECONDS
            .with_label_values(&["user"])
            .observe(started.elapsed().as_secs_f64());
        GITHUB_API_REQUESTS_TOTAL
            .with_label_values(&["user", if result.is_ok() { "success" } else { "failure" }])
            .inc();

        result
    }

    async fn fetch_user_inner(
        &self,
        access_token: &AccessToken,
    ) -> Result<UserProfile, GitHubError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_base_url))
            .bearer_auth(access_token.secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitHubError::UnexpectedStatus {
                endpoint: "user",
                status,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

//! GitHub OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub, with a
//! per-flow CSRF state and PKCE verifier held in the server-side session.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::Deserialize;

use super::middleware::{CurrentSession, MaybeSession, removal_cookie, session_cookie};
use crate::AppState;
use crate::error::AppError;

/// Create authentication router
///
/// Routes:
/// - GET /auth/github - Redirect to GitHub
/// - GET /oauth2/callback - OAuth callback
/// - POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/github", get(github_redirect))
        .route("/oauth2/callback", get(oauth_callback))
        .route("/logout", post(logout))
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /auth/github
///
/// Redirects user to GitHub authorization page.
///
/// # Steps
/// 1. Reuse the caller's session, or create one and set its cookie
/// 2. Generate CSRF state and PKCE verifier, store them in the session
/// 3. Redirect to GitHub with client_id, redirect_uri, scope, state, code_challenge
async fn github_redirect(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (session, jar) = match session {
        Some(session) => (session, jar),
        None => {
            let (id, handle) = state.sessions.create().await;
            let cookie = session_cookie(&state, &id)?;
            (CurrentSession { id, handle }, jar.add(cookie))
        }
    };

    let start = state.github.authorization_start();
    let authorize_url = start.url.clone();
    session.handle.write().await.begin_authorization(start);

    tracing::info!("Redirecting to GitHub for authorization");
    Ok((jar, Redirect::to(&authorize_url)))
}

/// Query parameters from GitHub callback
#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set by GitHub when the user denied access or the request was invalid
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /oauth2/callback
///
/// Handles OAuth callback from GitHub.
///
/// # Steps
/// 1. Verify CSRF state against the session's pending authorization
/// 2. Exchange code (with PKCE verifier) for an access token
/// 3. Store the token set in the session
/// 4. Redirect to home
async fn oauth_callback(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, AppError> {
    if let Some(error) = &query.error {
        // Only the flow GitHub is answering may be cancelled.
        if let (Some(session), Some(returned_state)) = (&session, query.state.as_deref()) {
            session.handle.write().await.cancel_pending(returned_state);
        }
        tracing::warn!(
            error = %error,
            description = ?query.error_description,
            "GitHub returned an authorization error"
        );
        return Err(AppError::Unauthorized);
    }

    let session = session.ok_or_else(|| {
        tracing::warn!("OAuth callback without a session");
        AppError::Unauthorized
    })?;

    let returned_state = query.state.as_deref().unwrap_or_default();
    let pkce_verifier = session
        .handle
        .write()
        .await
        .take_pending(returned_state, Utc::now())
        .ok_or_else(|| {
            tracing::warn!("OAuth state mismatch or no pending authorization");
            AppError::Unauthorized
        })?;

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

    let grant = state.github.exchange_code(code, pkce_verifier).await?;

    session.handle.write().await.apply_grant(grant);

    Ok(Redirect::temporary("/").into_response())
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Drops the server-side session, clears the cookie and redirects home.
async fn logout(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session) = session {
        state.sessions.remove(&session.id).await;
        tracing::info!("Session ended");
    }

    (jar.remove(removal_cookie()), Redirect::to("/"))
}

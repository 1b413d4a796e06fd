//! Session extraction
//!
//! Resolves the signed `session` cookie to an entry in the session store.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::session::{SessionHandle, SessionTicket, create_session_token, verify_session_token};
use crate::AppState;
use crate::error::AppError;

/// Name of the cookie carrying the signed session ticket
pub const SESSION_COOKIE: &str = "session";

/// A session resolved from the request cookie
#[derive(Clone)]
pub struct CurrentSession {
    pub id: String,
    pub handle: SessionHandle,
}

/// Optional session extractor
///
/// Yields `None` when the cookie is missing, tampered with, expired, or
/// names a session the store no longer holds.
pub struct MaybeSession(pub Option<CurrentSession>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(MaybeSession(None));
        };

        let ticket = match verify_session_token(cookie.value(), &state.session_secret) {
            Ok(ticket) => ticket,
            Err(_) => {
                tracing::debug!("Ignoring invalid session cookie");
                return Ok(MaybeSession(None));
            }
        };

        let session = state
            .sessions
            .get(&ticket.session_id)
            .await
            .map(|handle| CurrentSession {
                id: ticket.session_id,
                handle,
            });

        Ok(MaybeSession(session))
    }
}

/// Build the `session` cookie for a newly created session
pub fn session_cookie(state: &AppState, session_id: &str) -> Result<Cookie<'static>, AppError> {
    let ticket = SessionTicket::new(session_id.to_string(), state.config.auth.session_max_age);
    let token = create_session_token(&ticket, &state.session_secret)?;

    Ok(Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.should_use_secure_cookies())
        .path("/")
        .build())
}

/// Cookie that clears `session` from the browser
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

//! Session management
//!
//! Browser sessions are identified by a random ID carried in an
//! HMAC-signed cookie. The OAuth state for each session (tokens, profile,
//! pending authorization) lives server-side in an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use oauth2::{AccessToken, CsrfToken, PkceCodeVerifier, RefreshToken};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::metrics::SESSIONS_ACTIVE;
use crate::service::{AuthorizationStart, TokenGrant, UserProfile};

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECONDS: i64 = 30;

/// How long a login started at GitHub may take to come back
const PENDING_AUTHORIZATION_TTL_SECONDS: i64 = 600;

/// Signed cookie payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTicket {
    /// Key into the session store
    pub session_id: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl SessionTicket {
    pub fn new(session_id: String, max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(max_age_seconds),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `ticket` - Ticket to encode
/// * `secret` - HMAC secret key
///
/// # Returns
/// Signed token string
pub fn create_session_token(ticket: &SessionTicket, secret: &str) -> Result<String, AppError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload = serde_json::to_string(ticket).map_err(|e| AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// Returns `Unauthorized` if the signature is invalid, the token is
/// malformed, or the ticket has expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<SessionTicket, AppError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let (payload_b64, signature_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;
    mac.verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized)?;

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    let ticket: SessionTicket =
        serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;

    if ticket.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(ticket)
}

/// Generate a random secret suitable for signing session cookies
pub fn generate_session_secret() -> String {
    random_token(32)
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Authorization started at GitHub but not yet returned through the callback
#[derive(Debug)]
pub struct PendingAuthorization {
    pub csrf_state: CsrfToken,
    pub pkce_verifier: PkceCodeVerifier,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::seconds(PENDING_AUTHORIZATION_TTL_SECONDS)
    }

    fn matches(&self, state: &str) -> bool {
        self.csrf_state.secret().as_str() == state
    }
}

/// What the root handler should do with the stored token
#[derive(Debug)]
pub enum TokenStatus {
    Missing,
    Usable(AccessToken),
    Expired(Option<RefreshToken>),
}

/// OAuth state for one browser session
///
/// Token types from `oauth2` redact themselves in `Debug` output.
#[derive(Debug, Default)]
pub struct OAuthSession {
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<RefreshToken>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub user: Option<UserProfile>,
    pub pending: Option<PendingAuthorization>,
}

impl OAuthSession {
    /// Record a new authorization attempt, replacing any earlier one
    pub fn begin_authorization(&mut self, start: AuthorizationStart) {
        self.pending = Some(PendingAuthorization {
            csrf_state: start.csrf_state,
            pkce_verifier: start.pkce_verifier,
            created_at: Utc::now(),
        });
    }

    /// Consume the pending authorization and return its PKCE verifier if
    /// `state` matches and the authorization has not gone stale. The pending
    /// authorization is gone either way.
    pub fn take_pending(&mut self, state: &str, now: DateTime<Utc>) -> Option<PkceCodeVerifier> {
        let pending = self.pending.take()?;
        if pending.matches(state) && !pending.is_expired(now) {
            Some(pending.pkce_verifier)
        } else {
            None
        }
    }

    /// Drop the pending authorization, but only for the flow `state` names
    pub fn cancel_pending(&mut self, state: &str) -> bool {
        if self.pending.as_ref().is_some_and(|pending| pending.matches(state)) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Replace the token set after a code exchange
    pub fn apply_grant(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        self.refresh_token = grant.refresh_token;
        self.expires_at = grant.expires_at;
        self.scopes = grant.scopes;
        self.user = None;
    }

    /// Replace the token set after a refresh, keeping the old refresh token
    /// and scopes when GitHub does not send new ones
    pub fn apply_refresh(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        self.expires_at = grant.expires_at;
        if !grant.scopes.is_empty() {
            self.scopes = grant.scopes;
        }
    }

    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.expires_at = None;
        self.scopes.clear();
        self.user = None;
    }

    pub fn token_status(&self, now: DateTime<Utc>) -> TokenStatus {
        let Some(access_token) = &self.access_token else {
            return TokenStatus::Missing;
        };

        match self.expires_at {
            Some(expires_at)
                if expires_at <= now + chrono::Duration::seconds(EXPIRY_SKEW_SECONDS) =>
            {
                TokenStatus::Expired(self.refresh_token.clone())
            }
            _ => TokenStatus::Usable(access_token.clone()),
        }
    }

    /// Whether `token` is still the stored access token
    pub fn holds_token(&self, token: &AccessToken) -> bool {
        self.access_token
            .as_ref()
            .is_some_and(|current| current.secret() == token.secret())
    }

    /// Store a profile fetched with `token`
    ///
    /// Returns false and leaves the session untouched when the stored token
    /// was replaced while the fetch was in flight.
    pub fn store_profile(&mut self, token: &AccessToken, user: UserProfile) -> bool {
        if !self.holds_token(token) {
            return false;
        }
        self.user = Some(user);
        true
    }
}

/// Shared handle to one session's state
pub type SessionHandle = Arc<RwLock<OAuthSession>>;

/// In-memory session store (volatile, cleared on restart)
///
/// Entries expire after `idle` without access.
pub struct SessionStore {
    sessions: Cache<String, SessionHandle>,
}

impl SessionStore {
    /// Create new session store
    ///
    /// # Arguments
    /// * `max_sessions` - Maximum number of sessions held at once
    /// * `idle` - Idle lifetime of a session
    pub fn new(max_sessions: u64, idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle)
            .build();

        Self { sessions }
    }

    /// Create an empty session and return its ID
    pub async fn create(&self) -> (String, SessionHandle) {
        let id = random_token(32);
        let handle = SessionHandle::default();
        self.sessions.insert(id.clone(), handle.clone()).await;
        self.record_size().await;

        tracing::debug!("Session created");
        (id, handle)
    }

    /// Get session by ID
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).await
    }

    /// Remove session
    pub async fn remove(&self, id: &str) {
        self.sessions.invalidate(id).await;
        self.record_size().await;
    }

    /// Number of live sessions
    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    async fn record_size(&self) {
        let size = self.len().await;
        SESSIONS_ACTIVE.set(i64::try_from(size).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: AccessToken::new(access.to_string()),
            refresh_token: refresh.map(|r| RefreshToken::new(r.to_string())),
            expires_at: None,
            scopes: vec!["user".to_string()],
        }
    }

    #[test]
    fn session_token_round_trips() {
        let ticket = SessionTicket::new("abc".to_string(), 60);
        let token = create_session_token(&ticket, SECRET).unwrap();

        let decoded = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(decoded.session_id, "abc");
    }

    #[test]
    fn session_token_rejects_tampering() {
        let ticket = SessionTicket::new("abc".to_string(), 60);
        let token = create_session_token(&ticket, SECRET).unwrap();

        let forged = SessionTicket::new("someone-else".to_string(), 60);
        let forged_payload = create_session_token(&forged, SECRET).unwrap();
        let (forged_payload, _) = forged_payload.split_once('.').unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        assert!(verify_session_token(&format!("{forged_payload}.{signature}"), SECRET).is_err());
        assert!(verify_session_token(&token, "another-secret-key-32-bytes-long").is_err());
        assert!(verify_session_token("not-a-token", SECRET).is_err());
    }

    #[test]
    fn session_token_rejects_expired_ticket() {
        let ticket = SessionTicket::new("abc".to_string(), -1);
        let token = create_session_token(&ticket, SECRET).unwrap();

        assert!(matches!(
            verify_session_token(&token, SECRET),
            Err(AppError::Unauthorized)
        ));
    }

    fn pending(state: &str, created_at: DateTime<Utc>) -> Option<PendingAuthorization> {
        Some(PendingAuthorization {
            csrf_state: CsrfToken::new(state.to_string()),
            pkce_verifier: PkceCodeVerifier::new("verifier".to_string()),
            created_at,
        })
    }

    #[test]
    fn take_pending_requires_matching_state_and_consumes_it() {
        let now = Utc::now();
        let mut session = OAuthSession::default();
        session.pending = pending("expected", now);

        assert!(session.take_pending("wrong", now).is_none());
        assert!(session.pending.is_none());
        assert!(session.take_pending("expected", now).is_none());

        session.pending = pending("expected", now);
        let verifier = session.take_pending("expected", now).expect("state matches");
        assert_eq!(verifier.secret(), "verifier");
    }

    #[test]
    fn take_pending_rejects_stale_authorization() {
        let now = Utc::now();
        let mut session = OAuthSession::default();
        session.pending = pending("expected", now - chrono::Duration::minutes(11));

        assert!(session.take_pending("expected", now).is_none());
        assert!(session.pending.is_none());

        session.pending = pending("expected", now - chrono::Duration::minutes(9));
        assert!(session.take_pending("expected", now).is_some());
    }

    #[test]
    fn cancel_pending_only_for_matching_state() {
        let now = Utc::now();
        let mut session = OAuthSession::default();
        session.pending = pending("expected", now);

        assert!(!session.cancel_pending("forged"));
        assert!(session.pending.is_some());

        assert!(session.cancel_pending("expected"));
        assert!(session.pending.is_none());
    }

    #[test]
    fn store_profile_skips_replaced_token() {
        let mut session = OAuthSession::default();
        session.apply_grant(grant("first", None));
        let fetched_with = AccessToken::new("first".to_string());

        // A callback lands while the profile fetch is in flight.
        session.apply_grant(grant("second", None));
        let stored = session.store_profile(
            &fetched_with,
            UserProfile {
                id: 1,
                login: "stale".to_string(),
            },
        );

        assert!(!stored);
        assert!(session.user.is_none());

        let current = AccessToken::new("second".to_string());
        assert!(session.store_profile(
            &current,
            UserProfile {
                id: 2,
                login: "fresh".to_string(),
            },
        ));
        assert_eq!(session.user.as_ref().map(|u| u.login.as_str()), Some("fresh"));
    }

    #[test]
    fn apply_grant_overwrites_tokens_and_drops_profile() {
        let mut session = OAuthSession::default();
        session.apply_grant(grant("first", Some("refresh-1")));
        session.user = Some(UserProfile {
            id: 1,
            login: "old".to_string(),
        });

        session.apply_grant(grant("second", None));

        assert!(session.holds_token(&AccessToken::new("second".to_string())));
        assert!(session.refresh_token.is_none());
        assert!(session.user.is_none());
    }

    #[test]
    fn apply_refresh_keeps_refresh_token_when_absent() {
        let mut session = OAuthSession::default();
        session.apply_grant(grant("first", Some("refresh-1")));

        let mut refreshed = grant("second", None);
        refreshed.scopes.clear();
        session.apply_refresh(refreshed);

        assert!(session.holds_token(&AccessToken::new("second".to_string())));
        assert_eq!(
            session.refresh_token.as_ref().map(|t| t.secret().as_str()),
            Some("refresh-1")
        );
        assert_eq!(session.scopes, vec!["user".to_string()]);
    }

    #[test]
    fn token_status_tracks_expiry() {
        let now = Utc::now();
        let mut session = OAuthSession::default();
        assert!(matches!(session.token_status(now), TokenStatus::Missing));

        session.apply_grant(grant("token", Some("refresh")));
        assert!(matches!(session.token_status(now), TokenStatus::Usable(_)));

        session.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(matches!(session.token_status(now), TokenStatus::Usable(_)));

        session.expires_at = Some(now + chrono::Duration::seconds(5));
        assert!(matches!(
            session.token_status(now),
            TokenStatus::Expired(Some(_))
        ));

        session.refresh_token = None;
        assert!(matches!(
            session.token_status(now),
            TokenStatus::Expired(None)
        ));
    }

    #[test]
    fn debug_output_never_contains_tokens() {
        let mut session = OAuthSession::default();
        session.apply_grant(grant("gho_secret_value", Some("ghr_secret_value")));

        let rendered = format!("{session:?}");
        assert!(!rendered.contains("gho_secret_value"));
        assert!(!rendered.contains("ghr_secret_value"));
    }

    #[tokio::test]
    async fn store_creates_gets_and_removes_sessions() {
        let store = SessionStore::new(100, Duration::from_secs(60));

        let (id, handle) = store.create().await;
        handle.write().await.scopes.push("user".to_string());

        let fetched = store.get(&id).await.expect("session exists");
        assert_eq!(fetched.read().await.scopes, vec!["user".to_string()]);
        assert_eq!(store.len().await, 1);

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
        assert!(store.get("unknown").await.is_none());
    }

    #[tokio::test]
    async fn store_issues_distinct_session_ids() {
        let store = SessionStore::new(100, Duration::from_secs(60));

        let (first, _) = store.create().await;
        let (second, _) = store.create().await;

        assert_ne!(first, second);
        assert_eq!(store.len().await, 2);
    }
}

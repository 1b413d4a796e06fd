//! GitHub OAuth authentication
//!
//! Handles:
//! - GitHub OAuth flow
//! - Session management
//! - Session extraction

mod middleware;
mod oauth;
pub mod session;

pub use middleware::{CurrentSession, MaybeSession, SESSION_COOKIE};
pub use oauth::auth_router;
pub use session::{OAuthSession, SessionStore, create_session_token, verify_session_token};

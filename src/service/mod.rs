//! Service layer
//!
//! Contains the outbound GitHub logic separated from HTTP handlers.

mod github;

pub use github::{AuthorizationStart, GitHubClient, GitHubError, TokenGrant, UserProfile};

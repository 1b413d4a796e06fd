//! Landing page
//!
//! Shows the login link, or the signed-in user's GitHub profile.

use axum::{extract::State, response::Html};
use chrono::Utc;

use super::view::IndexView;
use crate::AppState;
use crate::auth::MaybeSession;
use crate::auth::session::TokenStatus;
use crate::error::AppError;

/// GET /
///
/// Without a usable token, renders the login page. With one, fetches the
/// profile from GitHub on every request, stores it in the session and
/// renders it. Expired tokens are refreshed first when a refresh token is
/// held; otherwise the session drops its tokens and the login page is shown.
pub async fn root(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Result<Html<String>, AppError> {
    let Some(session) = session else {
        return render_anonymous(&state);
    };

    let status = session.handle.read().await.token_status(Utc::now());
    let access_token = match status {
        TokenStatus::Missing => return render_anonymous(&state),
        TokenStatus::Usable(token) => token,
        TokenStatus::Expired(Some(refresh_token)) => {
            let grant = state.github.refresh(&refresh_token).await?;
            let token = grant.access_token.clone();
            session.handle.write().await.apply_refresh(grant);
            token
        }
        TokenStatus::Expired(None) => {
            let mut guard = session.handle.write().await;
            if matches!(guard.token_status(Utc::now()), TokenStatus::Expired(None)) {
                guard.clear_tokens();
                tracing::info!("Access token expired and cannot be refreshed");
            }
            drop(guard);
            return render_anonymous(&state);
        }
    };

    let user = state.github.fetch_user(&access_token).await?;

    let scopes = {
        let mut guard = session.handle.write().await;
        if !guard.store_profile(&access_token, user.clone()) {
            tracing::debug!("Access token changed during profile fetch; profile not stored");
        }
        guard.scopes.clone()
    };

    tracing::info!(github_id = user.id, login = %user.login, "Fetched GitHub profile");

    let html = state.pages.render_index(&IndexView {
        user: Some(&user),
        scopes: &scopes,
    })?;
    Ok(Html(html))
}

fn render_anonymous(state: &AppState) -> Result<Html<String>, AppError> {
    Ok(Html(state.pages.render_index(&IndexView::anonymous())?))
}

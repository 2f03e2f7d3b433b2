use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use serde::Deserialize;
use tower_sessions::Session;

use crate::models::login_log::LoginLog;
use crate::models::session::{SessionUser, OAUTH_NONCE_KEY, OAUTH_STATE_KEY, SESSION_USER_KEY};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::redirect_to_listing;

/// GET /login: send the browser to the identity provider, remembering the
/// `state`/`nonce` pair the callback must present.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Redirect, AppError> {
    let request = state.oidc.authorization_request().await?;

    session.insert(OAUTH_STATE_KEY, &request.state).await?;
    session.insert(OAUTH_NONCE_KEY, &request.nonce).await?;

    Ok(Redirect::to(&request.url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /authorize: OAuth callback. Validates the round-tripped state,
/// exchanges the code, verifies the ID-token claims, stores the identity in
/// the session and appends the access-log row.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    // Single-use: a replayed callback finds nothing to match against.
    let expected_state: Option<String> = session.remove(OAUTH_STATE_KEY).await?;
    let nonce: Option<String> = session.remove(OAUTH_NONCE_KEY).await?;

    if let Some(error) = query.error {
        return Err(AppError::AuthError(format!(
            "The identity provider declined the login: {error}"
        )));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::AuthError("Missing authorization code".to_string()))?;

    let valid_state = matches!((&expected_state, &query.state), (Some(expected), Some(got)) if expected == got);
    if !valid_state {
        return Err(AppError::AuthError(
            "Login attempt does not match this session".to_string(),
        ));
    }
    let nonce =
        nonce.ok_or_else(|| AppError::AuthError("Login attempt has expired".to_string()))?;

    let tokens = state.oidc.exchange_code(&code).await?;
    let claims = state.oidc.verify_id_token(&tokens.id_token, &nonce)?;

    let user = SessionUser {
        email: claims.email,
        name: claims.name,
    };
    session.insert(SESSION_USER_KEY, &user).await?;

    LoginLog::append(&state.pool, &user.email, tokens.expires_at, &tokens.access_token).await?;
    tracing::info!(email = %user.email, "User logged in");

    Ok(redirect_to_listing())
}

/// GET /logout: drop the session identity. Provider tokens are not revoked
/// and access-log rows stay put.
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    session.remove::<SessionUser>(SESSION_USER_KEY).await?;
    Ok(redirect_to_listing())
}

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_sessions::Session;

use crate::models::session::{SessionUser, SESSION_USER_KEY};
use crate::utils::error::AppError;

/// Extractor carrying the authenticated identity into a handler. Mutating
/// routes take this as an argument; a request without a logged-in session
/// is rejected with 401 before the handler body runs.
pub struct AuthUser(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| {
                AppError::InternalServerError(format!("Session layer unavailable: {message}"))
            })?;

        session
            .get::<SessionUser>(SESSION_USER_KEY)
            .await?
            .map(AuthUser)
            .ok_or_else(|| AppError::AuthError("Login required".to_string()))
    }
}

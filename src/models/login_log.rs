use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Append-only record of a successful login. There is deliberately no
/// update or delete path for these rows.
#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoginLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub email: String,
    pub token_expiry: Option<DateTime<Utc>>,
    pub access_token: String,
}

impl LoginLog {
    pub async fn append(
        pool: &PgPool,
        email: &str,
        token_expiry: Option<DateTime<Utc>>,
        access_token: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO login_logs (email, token_expiry, access_token) VALUES ($1, $2, $3)")
            .bind(email)
            .bind(token_expiry)
            .bind(access_token)
            .execute(pool)
            .await?;
        Ok(())
    }
}

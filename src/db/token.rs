use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

use crate::models::PasswordResetToken;

use super::NewResetToken;

pub async fn create<'c>(token: NewResetToken, conn: impl PgExecutor<'c>) -> Result<PasswordResetToken, sqlx::Error> {
    sqlx::query_as::<_, PasswordResetToken>(
        "INSERT INTO password_reset_tokens (user_id, token, expires_at, used, created_at)
        VALUES ($1, $2, $3, FALSE, $4)
        RETURNING *",
    )
    .bind(token.user_id)
    .bind(token.token)
    .bind(token.expires_at)
    .bind(token.created_at)
    .fetch_one(conn)
    .await
}

pub async fn get_by_value<'c>(
    token: &str,
    conn: impl PgExecutor<'c>,
) -> Result<Option<PasswordResetToken>, sqlx::Error> {
    sqlx::query_as::<_, PasswordResetToken>("SELECT * FROM password_reset_tokens WHERE token = $1")
        .bind(token)
        .fetch_optional(conn)
        .await
}

/// `None` when the token was already used or has expired.
pub async fn mark_used<'c>(
    id: i64,
    at: DateTime<Utc>,
    conn: impl PgExecutor<'c>,
) -> Result<Option<PasswordResetToken>, sqlx::Error> {
    sqlx::query_as::<_, PasswordResetToken>(
        "UPDATE password_reset_tokens SET used = TRUE
        WHERE id = $1 AND used = FALSE AND expires_at > $2
        RETURNING *",
    )
    .bind(id)
    .bind(at)
    .fetch_optional(conn)
    .await
}

pub async fn delete_expired<'c>(at: DateTime<Utc>, conn: impl PgExecutor<'c>) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1 OR used = TRUE")
        .bind(at)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

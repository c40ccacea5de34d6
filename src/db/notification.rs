use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

use crate::models::Notification;

pub async fn create<'c>(
    user_id: i64,
    message: &str,
    at: DateTime<Utc>,
    conn: impl PgExecutor<'c>,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (user_id, message, is_read, created_at)
        VALUES ($1, $2, FALSE, $3)
        RETURNING *",
    )
    .bind(user_id)
    .bind(message)
    .bind(at)
    .fetch_one(conn)
    .await
}

pub async fn for_user<'c>(user_id: i64, conn: impl PgExecutor<'c>) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await
}

pub async fn mark_read<'c>(user_id: i64, id: i64, conn: impl PgExecutor<'c>) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

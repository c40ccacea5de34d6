use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::models::{Session, User};

use super::NewUser;

pub async fn create<'c>(user: NewUser, conn: impl PgExecutor<'c>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (fullname, email, country, password_hash, role, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *",
    )
    .bind(user.fullname)
    .bind(user.email)
    .bind(user.country)
    .bind(user.password_hash)
    .bind(user.role)
    .bind(user.created_at)
    .fetch_one(conn)
    .await
}

pub async fn get_by_id<'c>(id: i64, conn: impl PgExecutor<'c>) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn get_by_email<'c>(
    email: &str,
    conn: impl PgExecutor<'c>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(conn)
        .await
}

pub async fn touch<'c>(id: i64, at: DateTime<Utc>, conn: impl PgExecutor<'c>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_seen = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_password<'c>(
    id: i64,
    password_hash: &str,
    conn: impl PgExecutor<'c>,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count<'c>(conn: impl PgExecutor<'c>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(conn)
        .await
}

pub mod sessions {
    use super::*;

    pub async fn create<'c>(session: Session, conn: impl PgExecutor<'c>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_by_id<'c>(
        id: Uuid,
        conn: impl PgExecutor<'c>,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn delete<'c>(id: Uuid, conn: impl PgExecutor<'c>) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete_for_user<'c>(user_id: i64, conn: impl PgExecutor<'c>) -> Result<u64, sqlx::Error> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(res.rows_affected())
    }
}

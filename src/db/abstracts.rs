use chrono::{DateTime, Utc};
use sqlx::{postgres::PgExecutor, Postgres, QueryBuilder};

use crate::models::{Abstract, AbstractStatus, Feedback};

use super::{AbstractChanges, AbstractFilter, NewAbstract, PendingAbstract};

pub async fn create<'c>(new: NewAbstract, conn: impl PgExecutor<'c>) -> Result<Abstract, sqlx::Error> {
    sqlx::query_as::<_, Abstract>(
        "INSERT INTO abstracts
            (title, content, field, institution, country, year, keywords, status, author_id, date_submitted)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
        RETURNING *",
    )
    .bind(new.title)
    .bind(new.content)
    .bind(new.field)
    .bind(new.institution)
    .bind(new.country)
    .bind(new.year)
    .bind(new.keywords)
    .bind(new.author_id)
    .bind(new.date_submitted)
    .fetch_one(conn)
    .await
}

pub async fn get_by_id<'c>(id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Abstract>, sqlx::Error> {
    sqlx::query_as::<_, Abstract>("SELECT * FROM abstracts WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn lock_by_id<'c>(id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Abstract>, sqlx::Error> {
    sqlx::query_as::<_, Abstract>("SELECT * FROM abstracts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn filter<'c>(filter: &AbstractFilter, conn: impl PgExecutor<'c>) -> Result<Vec<Abstract>, sqlx::Error> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM abstracts WHERE TRUE");
    if let Some(status) = filter.status {
        query_builder.push(" AND status = ").push_bind(status);
    }
    if let Some(field) = filter.field {
        query_builder.push(" AND field = ").push_bind(field);
    }
    if let Some(country) = &filter.country {
        query_builder.push(" AND LOWER(country) = LOWER(").push_bind(country.clone()).push(")");
    }
    if let Some(year) = filter.year {
        query_builder.push(" AND year = ").push_bind(year);
    }
    if let Some(author_id) = filter.author_id {
        query_builder.push(" AND author_id = ").push_bind(author_id);
    }
    if let Some(text) = &filter.text {
        let pattern = format!("%{}%", escape_like(text));
        query_builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(keywords, '') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    query_builder
        .push(" ORDER BY date_submitted DESC, id DESC LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    query_builder.build_query_as::<Abstract>().fetch_all(conn).await
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Writes `to` only if the row is still in `from`.
pub async fn set_status<'c>(
    id: i64,
    from: AbstractStatus,
    to: AbstractStatus,
    conn: impl PgExecutor<'c>,
) -> Result<Option<Abstract>, sqlx::Error> {
    sqlx::query_as::<_, Abstract>(
        "UPDATE abstracts SET status = $1 WHERE id = $2 AND status = $3 RETURNING *",
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await
}

pub async fn resubmit<'c>(
    id: i64,
    author_id: i64,
    changes: &AbstractChanges,
    at: DateTime<Utc>,
    conn: impl PgExecutor<'c>,
) -> Result<Option<Abstract>, sqlx::Error> {
    sqlx::query_as::<_, Abstract>(
        "UPDATE abstracts SET
            title = COALESCE($1, title),
            content = COALESCE($2, content),
            field = COALESCE($3, field),
            institution = COALESCE($4, institution),
            country = COALESCE($5, country),
            year = COALESCE($6, year),
            keywords = COALESCE($7, keywords),
            status = 'pending',
            date_submitted = $8
        WHERE id = $9 AND author_id = $10 AND status = 'rejected'
        RETURNING *",
    )
    .bind(changes.title.clone())
    .bind(changes.content.clone())
    .bind(changes.field)
    .bind(changes.institution.clone())
    .bind(changes.country.clone())
    .bind(changes.year)
    .bind(changes.keywords.clone())
    .bind(at)
    .bind(id)
    .bind(author_id)
    .fetch_optional(conn)
    .await
}

pub async fn count_by_status<'c>(conn: impl PgExecutor<'c>) -> Result<Vec<(AbstractStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (AbstractStatus, i64)>("SELECT status, COUNT(*) FROM abstracts GROUP BY status")
        .fetch_all(conn)
        .await
}

pub async fn recent_pending<'c>(limit: i64, conn: impl PgExecutor<'c>) -> Result<Vec<PendingAbstract>, sqlx::Error> {
    sqlx::query_as::<_, PendingAbstract>(
        "SELECT a.id, a.title, a.field, u.fullname AS author_name, a.date_submitted
        FROM abstracts a
        JOIN users u ON u.id = a.author_id
        WHERE a.status = 'pending'
        ORDER BY a.date_submitted DESC, a.id DESC
        LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

pub mod feedback {
    use super::*;

    pub async fn create<'c>(
        abstract_id: i64,
        admin_id: i64,
        comment: &str,
        at: DateTime<Utc>,
        conn: impl PgExecutor<'c>,
    ) -> Result<Feedback, sqlx::Error> {
        sqlx::query_as::<_, Feedback>(
            "INSERT INTO feedback (abstract_id, admin_id, comment, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(abstract_id)
        .bind(admin_id)
        .bind(comment)
        .bind(at)
        .fetch_one(conn)
        .await
    }

    pub async fn for_abstracts<'c>(ids: &[i64], conn: impl PgExecutor<'c>) -> Result<Vec<Feedback>, sqlx::Error> {
        sqlx::query_as::<_, Feedback>(
            "SELECT * FROM feedback WHERE abstract_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(ids)
        .fetch_all(conn)
        .await
    }
}

use sqlx::postgres::PgExecutor;

use crate::models::Review;

use super::{NewReview, ReviewEntry};

pub async fn create<'c>(review: NewReview, conn: impl PgExecutor<'c>) -> Result<Review, sqlx::Error> {
    sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (user_id, rating, comment, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *",
    )
    .bind(review.user_id)
    .bind(review.rating)
    .bind(review.comment)
    .bind(review.created_at)
    .fetch_one(conn)
    .await
}

pub async fn get_all<'c>(conn: impl PgExecutor<'c>) -> Result<Vec<ReviewEntry>, sqlx::Error> {
    sqlx::query_as::<_, ReviewEntry>(
        "SELECT r.id, r.rating, r.comment, r.created_at, r.user_id,
            u.fullname AS user_name, u.email AS user_email
        FROM reviews r
        LEFT JOIN users u ON u.id = r.user_id
        ORDER BY r.created_at DESC, r.id DESC",
    )
    .fetch_all(conn)
    .await
}

pub async fn count_by_rating<'c>(conn: impl PgExecutor<'c>) -> Result<Vec<(i32, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (i32, i64)>("SELECT rating, COUNT(*) FROM reviews GROUP BY rating")
        .fetch_all(conn)
        .await
}

pub mod contact {
    use sqlx::postgres::PgExecutor;

    use crate::{db::NewContact, models::ContactMessage};

    pub async fn create<'c>(contact: NewContact, conn: impl PgExecutor<'c>) -> Result<ContactMessage, sqlx::Error> {
        sqlx::query_as::<_, ContactMessage>(
            "INSERT INTO contact_messages (name, email, message, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(contact.name)
        .bind(contact.email)
        .bind(contact.message)
        .bind(contact.created_at)
        .fetch_one(conn)
        .await
    }
}

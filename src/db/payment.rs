use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

use crate::models::{Invoice, Payment, PaymentStatus};

use super::NewCheckout;

pub async fn create<'c>(checkout: &NewCheckout, conn: impl PgExecutor<'c>) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "INSERT INTO payments
            (abstract_id, amount, currency, status, method, transaction_id, checkout_url, created_at)
        VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7)
        RETURNING *",
    )
    .bind(checkout.abstract_id)
    .bind(checkout.amount)
    .bind(&checkout.currency)
    .bind(&checkout.method)
    .bind(&checkout.transaction_id)
    .bind(&checkout.checkout_url)
    .bind(checkout.generated_at)
    .fetch_one(conn)
    .await
}

pub async fn get_by_id<'c>(id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn lock_by_id<'c>(id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn get_by_transaction<'c>(
    transaction_id: &str,
    conn: impl PgExecutor<'c>,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await
}

pub async fn for_author<'c>(author_id: i64, conn: impl PgExecutor<'c>) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "SELECT p.* FROM payments p
        JOIN abstracts a ON a.id = p.abstract_id
        WHERE a.author_id = $1
        ORDER BY p.created_at DESC",
    )
    .bind(author_id)
    .fetch_all(conn)
    .await
}

pub async fn for_abstract<'c>(abstract_id: i64, conn: impl PgExecutor<'c>) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE abstract_id = $1 ORDER BY created_at DESC",
    )
    .bind(abstract_id)
    .fetch_all(conn)
    .await
}

/// Only a pending payment can be confirmed; `None` means someone else got
/// there first.
pub async fn mark_confirmed<'c>(
    id: i64,
    at: DateTime<Utc>,
    conn: impl PgExecutor<'c>,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = 'confirmed', payment_date = $1
        WHERE id = $2 AND status = 'pending'
        RETURNING *",
    )
    .bind(at)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn count_by_status<'c>(conn: impl PgExecutor<'c>) -> Result<Vec<(PaymentStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (PaymentStatus, i64)>("SELECT status, COUNT(*) FROM payments GROUP BY status")
        .fetch_all(conn)
        .await
}

pub mod invoices {
    use super::*;

    pub async fn create<'c>(
        checkout: &NewCheckout,
        payment_id: i64,
        conn: impl PgExecutor<'c>,
    ) -> Result<Invoice, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            "INSERT INTO invoices (abstract_id, payment_id, generated_at, due_date, paid, checkout_url)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING *",
        )
        .bind(checkout.abstract_id)
        .bind(payment_id)
        .bind(checkout.generated_at)
        .bind(checkout.due_date)
        .bind(&checkout.checkout_url)
        .fetch_one(conn)
        .await
    }

    pub async fn for_payment<'c>(payment_id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE payment_id = $1 ORDER BY generated_at DESC LIMIT 1",
        )
        .bind(payment_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn latest_unpaid<'c>(abstract_id: i64, conn: impl PgExecutor<'c>) -> Result<Option<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE abstract_id = $1 AND paid = FALSE
            ORDER BY generated_at DESC, id DESC LIMIT 1",
        )
        .bind(abstract_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn for_abstract<'c>(abstract_id: i64, conn: impl PgExecutor<'c>) -> Result<Vec<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE abstract_id = $1 ORDER BY generated_at DESC",
        )
        .bind(abstract_id)
        .fetch_all(conn)
        .await
    }

    /// Sets `paid`, never flips it back.
    pub async fn mark_paid<'c>(
        id: i64,
        payment_id: i64,
        at: DateTime<Utc>,
        conn: impl PgExecutor<'c>,
    ) -> Result<Invoice, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET paid = TRUE, paid_at = $1, payment_id = COALESCE(payment_id, $2)
            WHERE id = $3
            RETURNING *",
        )
        .bind(at)
        .bind(payment_id)
        .bind(id)
        .fetch_one(conn)
        .await
    }
}

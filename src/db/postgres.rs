use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    lifecycle,
    models::{
        Abstract, ContactMessage, Feedback, Invoice, Notification, PasswordResetToken,
        Payment, PaymentStatus, Review, Session, User,
    },
    PGPool,
};

use super::{
    abstracts, notification, payment, review, token, user, AbstractFilter, ConfirmOutcome,
    ConfirmPayment, DashboardStats, NewAbstract, NewCheckout, NewContact, NewResetToken, NewReview,
    NewUser, PaymentCounts, RatingStats, ResubmitRecord, ReviewApplied, ReviewEntry, ReviewRecord,
    StatusCounts, Store, StoreError, StoreResult, RECENT_PENDING_LIMIT,
};

/// Postgres-backed store. Multi-row operations run in one transaction that
/// rolls back when dropped before `commit`.
#[derive(Clone)]
pub struct PgStore {
    pool: PGPool,
}

impl PgStore {
    pub fn new(pool: PGPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        Ok(user::create(new, &self.pool).await?)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(user::get_by_id(id, &self.pool).await?)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(user::get_by_email(email, &self.pool).await?)
    }

    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        Ok(user::touch(id, at, &self.pool).await?)
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        Ok(user::sessions::create(session, &self.pool).await?)
    }

    async fn session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(user::sessions::get_by_id(id, &self.pool).await?)
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        Ok(user::sessions::delete(id, &self.pool).await?)
    }

    async fn create_abstract(&self, new: NewAbstract) -> StoreResult<Abstract> {
        Ok(abstracts::create(new, &self.pool).await?)
    }

    async fn abstract_by_id(&self, id: i64) -> StoreResult<Option<Abstract>> {
        Ok(abstracts::get_by_id(id, &self.pool).await?)
    }

    async fn list_abstracts(&self, filter: &AbstractFilter) -> StoreResult<Vec<Abstract>> {
        Ok(abstracts::filter(filter, &self.pool).await?)
    }

    async fn feedback_for(&self, abstract_ids: &[i64]) -> StoreResult<Vec<Feedback>> {
        if abstract_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(abstracts::feedback::for_abstracts(abstract_ids, &self.pool).await?)
    }

    async fn apply_review(&self, record: ReviewRecord) -> StoreResult<ReviewApplied> {
        let mut tx = self.pool.begin().await?;
        let current = abstracts::lock_by_id(record.abstract_id, &mut *tx)
            .await?
            .ok_or(StoreError::NotFound { entity: "abstract" })?;
        let target = lifecycle::next_status(current.status, record.action.transition())?;
        let updated = abstracts::set_status(current.id, current.status, target, &mut *tx)
            .await?
            .ok_or_else(|| StoreError::invalid_state("abstract changed during review"))?;

        let feedback = match &record.feedback {
            Some(comment) => Some(
                abstracts::feedback::create(updated.id, record.admin_id, comment, record.at, &mut *tx)
                    .await?,
            ),
            None => None,
        };
        let notification =
            notification::create(updated.author_id, &record.notification, record.at, &mut *tx).await?;
        tx.commit().await?;

        Ok(ReviewApplied {
            abstract_: updated,
            feedback,
            notification,
        })
    }

    async fn apply_resubmission(&self, record: ResubmitRecord) -> StoreResult<Abstract> {
        let mut tx = self.pool.begin().await?;
        let current = abstracts::lock_by_id(record.abstract_id, &mut *tx)
            .await?
            .ok_or(StoreError::NotFound { entity: "abstract" })?;
        if current.author_id != record.author_id {
            return Err(StoreError::invalid_state("abstract belongs to another author"));
        }
        lifecycle::next_status(current.status, lifecycle::Transition::Resubmit)?;
        let updated = abstracts::resubmit(
            current.id,
            record.author_id,
            &record.changes,
            record.at,
            &mut *tx,
        )
        .await?
        .ok_or_else(|| StoreError::invalid_state("abstract changed during resubmission"))?;
        notification::create(updated.author_id, &record.notification, record.at, &mut *tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn record_checkout(&self, checkout: NewCheckout) -> StoreResult<(Invoice, Payment)> {
        let mut tx = self.pool.begin().await?;
        let payment = payment::create(&checkout, &mut *tx).await?;
        let invoice = payment::invoices::create(&checkout, payment.id, &mut *tx).await?;
        tx.commit().await?;
        Ok((invoice, payment))
    }

    async fn payment_by_id(&self, id: i64) -> StoreResult<Option<Payment>> {
        Ok(payment::get_by_id(id, &self.pool).await?)
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        Ok(payment::get_by_transaction(transaction_id, &self.pool).await?)
    }

    async fn payments_for_author(&self, author_id: i64) -> StoreResult<Vec<Payment>> {
        Ok(payment::for_author(author_id, &self.pool).await?)
    }

    async fn payments_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Payment>> {
        Ok(payment::for_abstract(abstract_id, &self.pool).await?)
    }

    async fn invoices_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Invoice>> {
        Ok(payment::invoices::for_abstract(abstract_id, &self.pool).await?)
    }

    async fn confirm_payment(&self, request: ConfirmPayment) -> StoreResult<ConfirmOutcome> {
        let mut tx = self.pool.begin().await?;
        let current = payment::lock_by_id(request.payment_id, &mut *tx)
            .await?
            .ok_or(StoreError::NotFound { entity: "payment" })?;

        if current.status == PaymentStatus::Confirmed {
            let invoice = payment::invoices::for_payment(current.id, &mut *tx).await?;
            let abstract_ = abstracts::get_by_id(current.abstract_id, &mut *tx)
                .await?
                .ok_or(StoreError::NotFound { entity: "abstract" })?;
            tx.commit().await?;
            return Ok(ConfirmOutcome::AlreadyConfirmed {
                payment: current,
                invoice,
                abstract_,
            });
        }

        let invoice = match payment::invoices::for_payment(current.id, &mut *tx).await? {
            Some(invoice) => invoice,
            None => payment::invoices::latest_unpaid(current.abstract_id, &mut *tx)
                .await?
                .ok_or(StoreError::NotFound { entity: "invoice" })?,
        };
        let target = abstracts::lock_by_id(current.abstract_id, &mut *tx)
            .await?
            .ok_or(StoreError::NotFound { entity: "abstract" })?;
        let settled = lifecycle::settled_status(target.status)?;

        let confirmed = payment::mark_confirmed(current.id, request.at, &mut *tx)
            .await?
            .ok_or_else(|| StoreError::invalid_state("payment is no longer pending"))?;
        let invoice = payment::invoices::mark_paid(invoice.id, confirmed.id, request.at, &mut *tx).await?;
        let abstract_ = if settled == target.status {
            target
        } else {
            abstracts::set_status(target.id, target.status, settled, &mut *tx)
                .await?
                .ok_or_else(|| StoreError::invalid_state("abstract changed during confirmation"))?
        };
        notification::create(abstract_.author_id, &request.notification, request.at, &mut *tx).await?;
        tx.commit().await?;

        Ok(ConfirmOutcome::Confirmed {
            payment: confirmed,
            invoice,
            abstract_,
        })
    }

    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>> {
        Ok(notification::for_user(user_id, &self.pool).await?)
    }

    async fn mark_notification_read(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        Ok(notification::mark_read(user_id, id, &self.pool).await?)
    }

    async fn create_review(&self, new: NewReview) -> StoreResult<Review> {
        Ok(review::create(new, &self.pool).await?)
    }

    async fn list_reviews(&self) -> StoreResult<Vec<ReviewEntry>> {
        Ok(review::get_all(&self.pool).await?)
    }

    async fn review_stats(&self) -> StoreResult<RatingStats> {
        let counts = review::count_by_rating(&self.pool).await?;
        Ok(RatingStats::from_counts(&counts))
    }

    async fn create_reset_token(&self, new: NewResetToken) -> StoreResult<PasswordResetToken> {
        Ok(token::create(new, &self.pool).await?)
    }

    async fn reset_token_by_value(&self, value: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(token::get_by_value(value, &self.pool).await?)
    }

    async fn consume_reset_token(
        &self,
        token_id: i64,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let used = token::mark_used(token_id, at, &mut *tx)
            .await?
            .ok_or_else(|| StoreError::invalid_state("reset token is no longer valid"))?;
        if user::set_password(used.user_id, password_hash, &mut *tx).await? == 0 {
            return Err(StoreError::NotFound { entity: "user" });
        }
        user::sessions::delete_for_user(used.user_id, &mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn purge_expired_reset_tokens(&self, at: DateTime<Utc>) -> StoreResult<u64> {
        Ok(token::delete_expired(at, &self.pool).await?)
    }

    async fn create_contact(&self, contact: NewContact) -> StoreResult<ContactMessage> {
        Ok(review::contact::create(contact, &self.pool).await?)
    }

    async fn dashboard_stats(&self) -> StoreResult<DashboardStats> {
        let mut abstract_counts = StatusCounts::default();
        for (status, n) in abstracts::count_by_status(&self.pool).await? {
            abstract_counts.add(status, n);
        }
        let mut payment_counts = PaymentCounts::default();
        for (status, n) in payment::count_by_status(&self.pool).await? {
            match status {
                PaymentStatus::Confirmed => payment_counts.confirmed += n,
                PaymentStatus::Pending => payment_counts.pending += n,
            }
        }
        let users = user::count(&self.pool).await?;
        let recent_pending = abstracts::recent_pending(RECENT_PENDING_LIMIT as i64, &self.pool).await?;
        Ok(DashboardStats {
            abstracts: abstract_counts,
            payments: payment_counts,
            users,
            recent_pending,
        })
    }
}

/// These run against a real server: set `DATABASE_URL` and pass `--ignored`.
/// Every test gets its own database, migrated from `./migrations`.
#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::PgPool;

    use super::*;
    use crate::{
        db::AbstractChanges,
        lifecycle::ReviewAction,
        models::{AbstractStatus, Field, Role},
    };

    async fn user(store: &PgStore, email: &str, role: Role) -> User {
        store
            .create_user(NewUser {
                fullname: format!("User {email}"),
                email: email.into(),
                country: "MW".into(),
                password_hash: "x".into(),
                role,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn submit(store: &PgStore, author_id: i64, title: &str) -> Abstract {
        store
            .create_abstract(NewAbstract {
                title: title.into(),
                content: "Findings".into(),
                field: Field::Agriculture,
                institution: "UNIMA".into(),
                country: "MW".into(),
                year: 2024,
                keywords: Some("maize".into()),
                author_id,
                date_submitted: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn seed(pool: PgPool) -> (PgStore, User, User, Abstract) {
        let store = PgStore::new(pool);
        let admin = user(&store, "editor@example.org", Role::Admin).await;
        let author = user(&store, "ada@example.org", Role::Student).await;
        let submitted = submit(&store, author.id, "Soil health").await;
        (store, admin, author, submitted)
    }

    fn review(abstract_id: i64, admin_id: i64, action: ReviewAction, feedback: Option<&str>) -> ReviewRecord {
        ReviewRecord {
            abstract_id,
            admin_id,
            action,
            feedback: feedback.map(str::to_string),
            notification: "reviewed".into(),
            at: Utc::now(),
        }
    }

    fn checkout(abstract_id: i64, tx_ref: &str) -> NewCheckout {
        let now = Utc::now();
        NewCheckout {
            abstract_id,
            amount: 1.99,
            currency: "USD".into(),
            method: "paychangu".into(),
            transaction_id: tx_ref.into(),
            checkout_url: format!("https://checkout.example/{tx_ref}"),
            generated_at: now,
            due_date: now + Duration::days(7),
        }
    }

    fn confirm(payment_id: i64) -> ConfirmPayment {
        ConfirmPayment {
            payment_id,
            notification: "paid".into(),
            at: Utc::now(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn review_writes_status_feedback_and_notification_together(pool: PgPool) {
        let (store, admin, author, submitted) = seed(pool).await;

        let applied = store
            .apply_review(review(submitted.id, admin.id, ReviewAction::Reject, Some("redo")))
            .await
            .unwrap();
        assert_eq!(applied.abstract_.status, AbstractStatus::Rejected);
        assert_eq!(applied.feedback.unwrap().comment, "redo");
        assert_eq!(applied.notification.user_id, author.id);

        let err = store
            .apply_review(review(submitted.id, admin.id, ReviewAction::Approve, Some("ok")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        let current = store.abstract_by_id(submitted.id).await.unwrap().unwrap();
        assert_eq!(current.status, AbstractStatus::Rejected);
        assert_eq!(store.feedback_for(&[submitted.id]).await.unwrap().len(), 1);
        assert_eq!(store.notifications_for(author.id).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn resubmission_overwrites_only_the_given_fields(pool: PgPool) {
        let (store, admin, author, submitted) = seed(pool).await;
        let resubmit = |author_id: i64| ResubmitRecord {
            abstract_id: submitted.id,
            author_id,
            changes: AbstractChanges {
                title: Some("Soil health, revised".into()),
                ..Default::default()
            },
            notification: "resubmitted".into(),
            at: Utc::now(),
        };

        let err = store.apply_resubmission(resubmit(author.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        store
            .apply_review(review(submitted.id, admin.id, ReviewAction::Reject, None))
            .await
            .unwrap();
        let err = store.apply_resubmission(resubmit(admin.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        let updated = store.apply_resubmission(resubmit(author.id)).await.unwrap();
        assert_eq!(updated.status, AbstractStatus::Pending);
        assert_eq!(updated.title, "Soil health, revised");
        assert_eq!(updated.institution, submitted.institution);
        assert_eq!(updated.keywords, submitted.keywords);
        assert!(updated.date_submitted > submitted.date_submitted);
        assert_eq!(store.notifications_for(author.id).await.unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn second_confirmation_reports_the_first(pool: PgPool) {
        let (store, _, author, submitted) = seed(pool).await;
        let (invoice, payment) = store.record_checkout(checkout(submitted.id, "ABS-1-1")).await.unwrap();
        assert_eq!(invoice.payment_id, Some(payment.id));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(!invoice.paid);

        let first = match store.confirm_payment(confirm(payment.id)).await.unwrap() {
            ConfirmOutcome::Confirmed { payment, invoice, abstract_ } => {
                assert!(invoice.paid);
                assert!(invoice.paid_at.is_some());
                assert_eq!(abstract_.status, AbstractStatus::Published);
                payment
            }
            other => panic!("expected a fresh confirmation, got {other:?}"),
        };
        assert!(first.payment_date.is_some());

        match store.confirm_payment(confirm(payment.id)).await.unwrap() {
            ConfirmOutcome::AlreadyConfirmed { payment, invoice, abstract_ } => {
                assert_eq!(payment.payment_date, first.payment_date);
                assert!(invoice.unwrap().paid);
                assert_eq!(abstract_.status, AbstractStatus::Published);
            }
            other => panic!("expected the earlier confirmation, got {other:?}"),
        }
        assert_eq!(store.notifications_for(author.id).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_confirmations_settle_once(pool: PgPool) {
        let (store, _, author, submitted) = seed(pool).await;
        let (_, payment) = store.record_checkout(checkout(submitted.id, "ABS-1-2")).await.unwrap();

        let (a, b) = tokio::join!(
            store.confirm_payment(confirm(payment.id)),
            store.confirm_payment(confirm(payment.id))
        );
        let fresh = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, ConfirmOutcome::Confirmed { .. }))
            .count();
        assert_eq!(fresh, 1);
        assert_eq!(store.notifications_for(author.id).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn confirming_for_a_rejected_abstract_changes_nothing(pool: PgPool) {
        let (store, admin, author, submitted) = seed(pool).await;
        let (_, payment) = store.record_checkout(checkout(submitted.id, "ABS-1-3")).await.unwrap();
        store
            .apply_review(review(submitted.id, admin.id, ReviewAction::Reject, None))
            .await
            .unwrap();

        let err = store.confirm_payment(confirm(payment.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        let stored = store.payment_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.payment_date.is_none());
        assert!(!store.invoices_for_abstract(submitted.id).await.unwrap()[0].paid);
        let current = store.abstract_by_id(submitted.id).await.unwrap().unwrap();
        assert_eq!(current.status, AbstractStatus::Rejected);
        // only the rejection notice
        assert_eq!(store.notifications_for(author.id).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn search_treats_like_wildcards_literally(pool: PgPool) {
        let (store, _, author, _) = seed(pool).await;
        submit(&store, author.id, "100% maize coverage").await;
        submit(&store, author.id, "1000 maize farms").await;

        let hits = |text: &str| AbstractFilter {
            text: Some(text.into()),
            ..Default::default()
        };
        let found = store.list_abstracts(&hits("100%")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "100% maize coverage");
        assert_eq!(store.list_abstracts(&hits("MAIZE")).await.unwrap().len(), 3);
        assert!(store.list_abstracts(&hits("1_0")).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn dangling_references_and_duplicates_map_like_the_memory_store(pool: PgPool) {
        let store = PgStore::new(pool);
        user(&store, "ada@example.org", Role::Student).await;

        let err = store
            .create_abstract(NewAbstract {
                title: "Orphan".into(),
                content: "c".into(),
                field: Field::Ai,
                institution: "i".into(),
                country: "MW".into(),
                year: 2024,
                keywords: None,
                author_id: 9_999,
                date_submitted: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "author" }));

        let err = store
            .create_user(NewUser {
                fullname: "Other".into(),
                email: "ada@example.org".into(),
                country: "ZM".into(),
                password_hash: "y".into(),
                role: Role::Student,
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn reset_token_is_consumed_once_and_ends_sessions(pool: PgPool) {
        let (store, _, author, _) = seed(pool).await;
        let now = Utc::now();
        store
            .create_session(Session {
                id: Uuid::new_v4(),
                user_id: author.id,
                created_at: now,
                expires_at: now + Duration::hours(1),
            })
            .await
            .unwrap();
        let token = store
            .create_reset_token(NewResetToken {
                user_id: author.id,
                token: "reset-token".into(),
                expires_at: now + Duration::minutes(5),
                created_at: now,
            })
            .await
            .unwrap();

        store.consume_reset_token(token.id, "new-hash", Utc::now()).await.unwrap();
        let err = store
            .consume_reset_token(token.id, "newer-hash", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        let reloaded = store.user_by_id(author.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
        assert_eq!(store.purge_expired_reset_tokens(Utc::now()).await.unwrap(), 1);
    }
}

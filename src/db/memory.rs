//! In-process store for development and tests.
//!
//! Every write clones the tables, mutates the copy and swaps it in only when
//! the whole operation succeeded, which gives the same all-or-nothing
//! behaviour as a Postgres transaction. Fail points make an operation error
//! out partway so that rollback can be observed.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    lifecycle::{self, Transition},
    models::{
        Abstract, AbstractStatus, ContactMessage, Feedback, Invoice, Notification,
        PasswordResetToken, Payment, PaymentStatus, Review, Session, User,
    },
};

use super::{
    AbstractFilter, ConfirmOutcome, ConfirmPayment, DashboardStats, NewAbstract, NewCheckout,
    NewContact, NewResetToken, NewReview, NewUser, PaymentCounts, PendingAbstract, RatingStats,
    ResubmitRecord, ReviewApplied, ReviewEntry, ReviewRecord, StatusCounts, Store, StoreError,
    StoreResult, RECENT_PENDING_LIMIT,
};

/// Steps inside multi-row operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    PaymentInsert,
    InvoiceInsert,
    PaymentUpdate,
    InvoiceUpdate,
    AbstractUpdate,
    FeedbackInsert,
    NotificationInsert,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequences: HashMap<&'static str, i64>,
    users: Vec<User>,
    sessions: HashMap<Uuid, Session>,
    abstracts: Vec<Abstract>,
    payments: Vec<Payment>,
    invoices: Vec<Invoice>,
    feedback: Vec<Feedback>,
    notifications: Vec<Notification>,
    reviews: Vec<Review>,
    reset_tokens: Vec<PasswordResetToken>,
    contacts: Vec<ContactMessage>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let seq = self.sequences.entry(table).or_insert(0);
        *seq += 1;
        *seq
    }

    fn abstract_mut(&mut self, id: i64) -> StoreResult<&mut Abstract> {
        self.abstracts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { entity: "abstract" })
    }

    fn notify(&mut self, user_id: i64, message: &str, at: DateTime<Utc>) -> Notification {
        let notification = Notification {
            id: self.next_id("notifications"),
            user_id,
            message: message.to_string(),
            is_read: false,
            created_at: at,
        };
        self.notifications.push(notification.clone());
        notification
    }
}

struct Faults(HashSet<FailPoint>);

impl Faults {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.0.contains(&point) {
            return Err(StoreError::Injected { point });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_points: Mutex<HashSet<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later operation that reaches `point` fail until cleared.
    pub fn fail_at(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    pub fn clear_fail_points(&self) {
        self.fail_points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transaction<T>(&self, op: impl FnOnce(&mut Tables, &Faults) -> StoreResult<T>) -> StoreResult<T> {
        let faults = Faults(
            self.fail_points
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );
        let mut committed = self.lock();
        let mut working = (*committed).clone();
        let out = op(&mut working, &faults)?;
        *committed = working;
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        self.transaction(|t, _| {
            if t.users.iter().any(|u| u.email == new.email) {
                return Err(StoreError::Duplicate {
                    constraint: "users_email_key".to_string(),
                });
            }
            let user = User {
                id: t.next_id("users"),
                fullname: new.fullname,
                email: new.email,
                country: new.country,
                password_hash: new.password_hash,
                role: new.role,
                last_seen: None,
                created_at: new.created_at,
            };
            t.users.push(user.clone());
            Ok(user)
        })
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.last_seen = Some(at);
        }
        Ok(())
    }

    async fn create_session(&self, session: Session) -> StoreResult<()> {
        self.lock().sessions.insert(session.id, session);
        Ok(())
    }

    async fn session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        self.lock().sessions.remove(&id);
        Ok(())
    }

    async fn create_abstract(&self, new: NewAbstract) -> StoreResult<Abstract> {
        self.transaction(|t, _| {
            if !t.users.iter().any(|u| u.id == new.author_id) {
                return Err(StoreError::NotFound { entity: "author" });
            }
            let created = Abstract {
                id: t.next_id("abstracts"),
                title: new.title,
                content: new.content,
                field: new.field,
                institution: new.institution,
                country: new.country,
                year: new.year,
                keywords: new.keywords,
                status: AbstractStatus::Pending,
                author_id: new.author_id,
                date_submitted: new.date_submitted,
            };
            t.abstracts.push(created.clone());
            Ok(created)
        })
    }

    async fn abstract_by_id(&self, id: i64) -> StoreResult<Option<Abstract>> {
        Ok(self.lock().abstracts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_abstracts(&self, filter: &AbstractFilter) -> StoreResult<Vec<Abstract>> {
        let mut found: Vec<Abstract> = self
            .lock()
            .abstracts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date_submitted.cmp(&a.date_submitted).then(b.id.cmp(&a.id)));
        Ok(found
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn feedback_for(&self, abstract_ids: &[i64]) -> StoreResult<Vec<Feedback>> {
        let mut found: Vec<Feedback> = self
            .lock()
            .feedback
            .iter()
            .filter(|f| abstract_ids.contains(&f.abstract_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn apply_review(&self, record: ReviewRecord) -> StoreResult<ReviewApplied> {
        self.transaction(|t, faults| {
            let target = t.abstract_mut(record.abstract_id)?;
            target.status = lifecycle::next_status(target.status, record.action.transition())?;
            let updated = target.clone();
            faults.check(FailPoint::AbstractUpdate)?;

            let feedback = match &record.feedback {
                Some(comment) => {
                    faults.check(FailPoint::FeedbackInsert)?;
                    let feedback = Feedback {
                        id: t.next_id("feedback"),
                        abstract_id: updated.id,
                        admin_id: record.admin_id,
                        comment: comment.clone(),
                        created_at: record.at,
                    };
                    t.feedback.push(feedback.clone());
                    Some(feedback)
                }
                None => None,
            };
            faults.check(FailPoint::NotificationInsert)?;
            let notification = t.notify(updated.author_id, &record.notification, record.at);
            Ok(ReviewApplied {
                abstract_: updated,
                feedback,
                notification,
            })
        })
    }

    async fn apply_resubmission(&self, record: ResubmitRecord) -> StoreResult<Abstract> {
        self.transaction(|t, faults| {
            let target = t.abstract_mut(record.abstract_id)?;
            if target.author_id != record.author_id {
                return Err(StoreError::invalid_state("abstract belongs to another author"));
            }
            target.status = lifecycle::next_status(target.status, Transition::Resubmit)?;
            record.changes.apply_to(target);
            target.date_submitted = record.at;
            let updated = target.clone();
            faults.check(FailPoint::AbstractUpdate)?;

            faults.check(FailPoint::NotificationInsert)?;
            t.notify(updated.author_id, &record.notification, record.at);
            Ok(updated)
        })
    }

    async fn record_checkout(&self, checkout: NewCheckout) -> StoreResult<(Invoice, Payment)> {
        self.transaction(|t, faults| {
            if !t.abstracts.iter().any(|a| a.id == checkout.abstract_id) {
                return Err(StoreError::NotFound { entity: "abstract" });
            }
            if t.payments.iter().any(|p| p.transaction_id == checkout.transaction_id) {
                return Err(StoreError::Duplicate {
                    constraint: "payments_transaction_id_key".to_string(),
                });
            }
            let payment = Payment {
                id: t.next_id("payments"),
                abstract_id: checkout.abstract_id,
                amount: checkout.amount,
                currency: checkout.currency.clone(),
                status: PaymentStatus::Pending,
                method: checkout.method.clone(),
                transaction_id: checkout.transaction_id.clone(),
                checkout_url: Some(checkout.checkout_url.clone()),
                payment_date: None,
                created_at: checkout.generated_at,
            };
            t.payments.push(payment.clone());
            faults.check(FailPoint::PaymentInsert)?;

            let invoice = Invoice {
                id: t.next_id("invoices"),
                abstract_id: checkout.abstract_id,
                payment_id: Some(payment.id),
                generated_at: checkout.generated_at,
                due_date: checkout.due_date,
                paid: false,
                paid_at: None,
                checkout_url: Some(checkout.checkout_url.clone()),
            };
            t.invoices.push(invoice.clone());
            faults.check(FailPoint::InvoiceInsert)?;
            Ok((invoice, payment))
        })
    }

    async fn payment_by_id(&self, id: i64) -> StoreResult<Option<Payment>> {
        Ok(self.lock().payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn payments_for_author(&self, author_id: i64) -> StoreResult<Vec<Payment>> {
        let tables = self.lock();
        let owned: HashSet<i64> = tables
            .abstracts
            .iter()
            .filter(|a| a.author_id == author_id)
            .map(|a| a.id)
            .collect();
        let mut found: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|p| owned.contains(&p.abstract_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn payments_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Payment>> {
        let mut found: Vec<Payment> = self
            .lock()
            .payments
            .iter()
            .filter(|p| p.abstract_id == abstract_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn invoices_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Invoice>> {
        let mut found: Vec<Invoice> = self
            .lock()
            .invoices
            .iter()
            .filter(|i| i.abstract_id == abstract_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(found)
    }

    async fn confirm_payment(&self, request: ConfirmPayment) -> StoreResult<ConfirmOutcome> {
        self.transaction(|t, faults| {
            let current = t
                .payments
                .iter()
                .find(|p| p.id == request.payment_id)
                .cloned()
                .ok_or(StoreError::NotFound { entity: "payment" })?;

            if current.status == PaymentStatus::Confirmed {
                let invoice = t
                    .invoices
                    .iter()
                    .find(|i| i.payment_id == Some(current.id))
                    .cloned();
                let abstract_ = t.abstract_mut(current.abstract_id)?.clone();
                return Ok(ConfirmOutcome::AlreadyConfirmed {
                    payment: current,
                    invoice,
                    abstract_,
                });
            }

            let invoice_idx = t
                .invoices
                .iter()
                .position(|i| i.payment_id == Some(current.id))
                .or_else(|| {
                    t.invoices
                        .iter()
                        .enumerate()
                        .filter(|(_, i)| i.abstract_id == current.abstract_id && !i.paid)
                        .max_by(|(_, a), (_, b)| a.generated_at.cmp(&b.generated_at).then(a.id.cmp(&b.id)))
                        .map(|(idx, _)| idx)
                })
                .ok_or(StoreError::NotFound { entity: "invoice" })?;

            let settled = lifecycle::settled_status(t.abstract_mut(current.abstract_id)?.status)?;

            let payment = t
                .payments
                .iter_mut()
                .find(|p| p.id == current.id)
                .ok_or(StoreError::NotFound { entity: "payment" })?;
            payment.status = PaymentStatus::Confirmed;
            payment.payment_date = Some(request.at);
            let payment = payment.clone();
            faults.check(FailPoint::PaymentUpdate)?;

            let invoice = &mut t.invoices[invoice_idx];
            invoice.paid = true;
            invoice.paid_at = Some(request.at);
            invoice.payment_id.get_or_insert(payment.id);
            let invoice = invoice.clone();
            faults.check(FailPoint::InvoiceUpdate)?;

            let target = t.abstract_mut(current.abstract_id)?;
            target.status = settled;
            let abstract_ = target.clone();
            faults.check(FailPoint::AbstractUpdate)?;

            faults.check(FailPoint::NotificationInsert)?;
            t.notify(abstract_.author_id, &request.notification, request.at);

            Ok(ConfirmOutcome::Confirmed {
                payment,
                invoice,
                abstract_,
            })
        })
    }

    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let mut found: Vec<Notification> = self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn mark_notification_read(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_review(&self, new: NewReview) -> StoreResult<Review> {
        self.transaction(|t, _| {
            let review = Review {
                id: t.next_id("reviews"),
                user_id: new.user_id,
                rating: new.rating,
                comment: new.comment,
                created_at: new.created_at,
            };
            t.reviews.push(review.clone());
            Ok(review)
        })
    }

    async fn list_reviews(&self) -> StoreResult<Vec<ReviewEntry>> {
        let tables = self.lock();
        let mut entries: Vec<ReviewEntry> = tables
            .reviews
            .iter()
            .map(|r| {
                let author = r
                    .user_id
                    .and_then(|id| tables.users.iter().find(|u| u.id == id));
                ReviewEntry {
                    id: r.id,
                    rating: r.rating,
                    comment: r.comment.clone(),
                    created_at: r.created_at,
                    user_id: r.user_id,
                    user_name: author.map(|u| u.fullname.clone()),
                    user_email: author.map(|u| u.email.clone()),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn review_stats(&self) -> StoreResult<RatingStats> {
        let mut counts: HashMap<i32, i64> = HashMap::new();
        for review in self.lock().reviews.iter() {
            *counts.entry(review.rating).or_insert(0) += 1;
        }
        let counts: Vec<(i32, i64)> = counts.into_iter().collect();
        Ok(RatingStats::from_counts(&counts))
    }

    async fn create_reset_token(&self, new: NewResetToken) -> StoreResult<PasswordResetToken> {
        self.transaction(|t, _| {
            let token = PasswordResetToken {
                id: t.next_id("password_reset_tokens"),
                user_id: new.user_id,
                token: new.token,
                expires_at: new.expires_at,
                used: false,
                created_at: new.created_at,
            };
            t.reset_tokens.push(token.clone());
            Ok(token)
        })
    }

    async fn reset_token_by_value(&self, value: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(self.lock().reset_tokens.iter().find(|t| t.token == value).cloned())
    }

    async fn consume_reset_token(
        &self,
        token_id: i64,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.transaction(|t, _| {
            let token = t
                .reset_tokens
                .iter_mut()
                .find(|tok| tok.id == token_id && tok.is_valid(at))
                .ok_or_else(|| StoreError::invalid_state("reset token is no longer valid"))?;
            token.used = true;
            let user_id = token.user_id;
            let user = t
                .users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or(StoreError::NotFound { entity: "user" })?;
            user.password_hash = password_hash.to_string();
            t.sessions.retain(|_, s| s.user_id != user_id);
            Ok(())
        })
    }

    async fn purge_expired_reset_tokens(&self, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.lock();
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|t| t.expires_at >= at && !t.used);
        Ok((before - tables.reset_tokens.len()) as u64)
    }

    async fn create_contact(&self, new: NewContact) -> StoreResult<ContactMessage> {
        self.transaction(|t, _| {
            let contact = ContactMessage {
                id: t.next_id("contact_messages"),
                name: new.name,
                email: new.email,
                message: new.message,
                created_at: new.created_at,
            };
            t.contacts.push(contact.clone());
            Ok(contact)
        })
    }

    async fn dashboard_stats(&self) -> StoreResult<DashboardStats> {
        let tables = self.lock();
        let mut abstracts = StatusCounts::default();
        for a in tables.abstracts.iter() {
            abstracts.add(a.status, 1);
        }
        let mut payments = PaymentCounts::default();
        for p in tables.payments.iter() {
            match p.status {
                PaymentStatus::Confirmed => payments.confirmed += 1,
                PaymentStatus::Pending => payments.pending += 1,
            }
        }
        let mut pending: Vec<&Abstract> = tables
            .abstracts
            .iter()
            .filter(|a| a.status == AbstractStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.date_submitted.cmp(&a.date_submitted).then(b.id.cmp(&a.id)));
        let recent_pending = pending
            .into_iter()
            .take(RECENT_PENDING_LIMIT)
            .map(|a| PendingAbstract {
                id: a.id,
                title: a.title.clone(),
                field: a.field,
                author_name: tables
                    .users
                    .iter()
                    .find(|u| u.id == a.author_id)
                    .map(|u| u.fullname.clone())
                    .unwrap_or_default(),
                date_submitted: a.date_submitted,
            })
            .collect();
        Ok(DashboardStats {
            abstracts,
            payments,
            users: tables.users.len() as i64,
            recent_pending,
        })
    }
}

pub mod abstracts;
pub mod memory;
pub mod notification;
pub mod payment;
pub mod postgres;
pub mod review;
pub mod token;
pub mod user;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use log::{info, warn};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::{
    lifecycle::ReviewAction,
    models::{
        Abstract, AbstractStatus, ContactMessage, Feedback, Field, Invoice, Notification,
        PasswordResetToken, Payment, Review, Role, Session, User,
    },
    PGPool,
};

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, Display, Error)]
pub enum StoreError {
    #[display(fmt = "{}", entity)]
    NotFound { entity: &'static str },

    #[display(fmt = "duplicate value for {}", constraint)]
    Duplicate { constraint: String },

    #[display(fmt = "{}", message)]
    InvalidState { message: String },

    #[display(fmt = "{}", _0)]
    Sqlx(sqlx::Error),

    #[display(fmt = "injected failure at {:?}", point)]
    Injected { point: FailPoint },
}

impl StoreError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        StoreError::InvalidState { message: message.into() }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate {
                    constraint: db_err.constraint().unwrap_or("unique constraint").to_string(),
                };
            }
            // a dangling reference is a missing parent row, as MemoryStore reports it
            if db_err.is_foreign_key_violation() {
                let entity = match db_err.constraint() {
                    Some(c) if c.contains("author") || c.contains("user") => "author",
                    Some(c) if c.contains("abstract") => "abstract",
                    Some(c) if c.contains("payment") => "payment",
                    _ => "referenced record",
                };
                return StoreError::NotFound { entity };
            }
        }
        StoreError::Sqlx(err)
    }
}

impl From<crate::lifecycle::InvalidTransition> for StoreError {
    fn from(err: crate::lifecycle::InvalidTransition) -> Self {
        StoreError::InvalidState { message: err.to_string() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub country: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAbstract {
    pub title: String,
    pub content: String,
    pub field: Field,
    pub institution: String,
    pub country: String,
    pub year: i32,
    pub keywords: Option<String>,
    pub author_id: i64,
    pub date_submitted: DateTime<Utc>,
}

/// Fields a rejected abstract may overwrite on resubmission.
#[derive(Debug, Clone, Default)]
pub struct AbstractChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub field: Option<Field>,
    pub institution: Option<String>,
    pub country: Option<String>,
    pub year: Option<i32>,
    pub keywords: Option<String>,
}

impl AbstractChanges {
    pub fn apply_to(&self, target: &mut Abstract) {
        if let Some(v) = &self.title {
            target.title = v.clone();
        }
        if let Some(v) = &self.content {
            target.content = v.clone();
        }
        if let Some(v) = self.field {
            target.field = v;
        }
        if let Some(v) = &self.institution {
            target.institution = v.clone();
        }
        if let Some(v) = &self.country {
            target.country = v.clone();
        }
        if let Some(v) = self.year {
            target.year = v;
        }
        if let Some(v) = &self.keywords {
            target.keywords = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct AbstractFilter {
    pub status: Option<AbstractStatus>,
    pub field: Option<Field>,
    pub country: Option<String>,
    pub year: Option<i32>,
    pub author_id: Option<i64>,
    /// Case-insensitive match on title, content and keywords.
    pub text: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AbstractFilter {
    fn default() -> Self {
        Self {
            status: None,
            field: None,
            country: None,
            year: None,
            author_id: None,
            text: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl AbstractFilter {
    pub fn matches(&self, a: &Abstract) -> bool {
        if self.status.is_some_and(|s| s != a.status) {
            return false;
        }
        if self.field.is_some_and(|f| f != a.field) {
            return false;
        }
        if let Some(country) = &self.country {
            if !a.country.eq_ignore_ascii_case(country) {
                return false;
            }
        }
        if self.year.is_some_and(|y| y != a.year) {
            return false;
        }
        if self.author_id.is_some_and(|id| id != a.author_id) {
            return false;
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let hit = a.title.to_lowercase().contains(&needle)
                || a.content.to_lowercase().contains(&needle)
                || a
                    .keywords
                    .as_deref()
                    .is_some_and(|k| k.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct ReviewRecord {
    pub abstract_id: i64,
    pub admin_id: i64,
    pub action: ReviewAction,
    pub feedback: Option<String>,
    pub notification: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReviewApplied {
    pub abstract_: Abstract,
    pub feedback: Option<Feedback>,
    pub notification: Notification,
}

#[derive(Debug, Clone)]
pub struct ResubmitRecord {
    pub abstract_id: i64,
    pub author_id: i64,
    pub changes: AbstractChanges,
    pub notification: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub abstract_id: i64,
    pub amount: f64,
    pub currency: String,
    pub method: String,
    pub transaction_id: String,
    pub checkout_url: String,
    pub generated_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub payment_id: i64,
    pub notification: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Confirmed {
        payment: Payment,
        invoice: Invoice,
        abstract_: Abstract,
    },
    AlreadyConfirmed {
        payment: Payment,
        invoice: Option<Invoice>,
        abstract_: Abstract,
    },
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub user_id: Option<i64>,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewEntry {
    pub id: i64,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RatingStats {
    pub count: i64,
    pub average: f64,
    /// Index 0 holds one-star ratings.
    pub distribution: [i64; 5],
}

impl RatingStats {
    /// Builds the summary from `(rating, count)` pairs, ignoring ratings
    /// outside 1..=5.
    pub fn from_counts(counts: &[(i32, i64)]) -> Self {
        let mut stats = RatingStats::default();
        let mut sum = 0i64;
        for &(rating, n) in counts {
            if !(1..=5).contains(&rating) {
                continue;
            }
            stats.distribution[(rating - 1) as usize] += n;
            stats.count += n;
            sum += rating as i64 * n;
        }
        if stats.count > 0 {
            stats.average = ((sum as f64 / stats.count as f64) * 100.0).round() / 100.0;
        }
        stats
    }
}

#[derive(Debug, Clone)]
pub struct NewResetToken {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub published: i64,
    pub total: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: AbstractStatus, n: i64) {
        match status {
            AbstractStatus::Pending => self.pending += n,
            AbstractStatus::Approved => self.approved += n,
            AbstractStatus::Rejected => self.rejected += n,
            AbstractStatus::Published => self.published += n,
        }
        self.total += n;
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PaymentCounts {
    pub confirmed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PendingAbstract {
    pub id: i64,
    pub title: String,
    pub field: Field,
    pub author_name: String,
    pub date_submitted: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub abstracts: StatusCounts,
    pub payments: PaymentCounts,
    pub users: i64,
    pub recent_pending: Vec<PendingAbstract>,
}

pub const RECENT_PENDING_LIMIT: usize = 10;

/// Every read and every atomic write the portal performs.
///
/// Methods that touch more than one row are one transaction each: either
/// all of their writes are visible afterwards or none are.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn touch_user(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    async fn create_session(&self, session: Session) -> StoreResult<()>;
    async fn session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> StoreResult<()>;

    async fn create_abstract(&self, new: NewAbstract) -> StoreResult<Abstract>;
    async fn abstract_by_id(&self, id: i64) -> StoreResult<Option<Abstract>>;
    async fn list_abstracts(&self, filter: &AbstractFilter) -> StoreResult<Vec<Abstract>>;
    async fn feedback_for(&self, abstract_ids: &[i64]) -> StoreResult<Vec<Feedback>>;
    /// Status change, optional feedback and the author notification.
    async fn apply_review(&self, record: ReviewRecord) -> StoreResult<ReviewApplied>;
    /// Field changes, reset to pending and the author notification.
    async fn apply_resubmission(&self, record: ResubmitRecord) -> StoreResult<Abstract>;

    /// Invoice and payment, linked, or neither.
    async fn record_checkout(&self, checkout: NewCheckout) -> StoreResult<(Invoice, Payment)>;
    async fn payment_by_id(&self, id: i64) -> StoreResult<Option<Payment>>;
    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>>;
    async fn payments_for_author(&self, author_id: i64) -> StoreResult<Vec<Payment>>;
    async fn payments_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Payment>>;
    async fn invoices_for_abstract(&self, abstract_id: i64) -> StoreResult<Vec<Invoice>>;
    /// Payment confirmed, invoice paid, abstract published, author notified.
    async fn confirm_payment(&self, request: ConfirmPayment) -> StoreResult<ConfirmOutcome>;

    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: i64, id: i64) -> StoreResult<bool>;

    async fn create_review(&self, review: NewReview) -> StoreResult<Review>;
    async fn list_reviews(&self) -> StoreResult<Vec<ReviewEntry>>;
    async fn review_stats(&self) -> StoreResult<RatingStats>;

    async fn create_reset_token(&self, token: NewResetToken) -> StoreResult<PasswordResetToken>;
    async fn reset_token_by_value(&self, token: &str) -> StoreResult<Option<PasswordResetToken>>;
    /// Marks the token used, stores the new hash and drops the user's sessions.
    async fn consume_reset_token(
        &self,
        token_id: i64,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn purge_expired_reset_tokens(&self, at: DateTime<Utc>) -> StoreResult<u64>;

    async fn create_contact(&self, contact: NewContact) -> StoreResult<ContactMessage>;

    async fn dashboard_stats(&self) -> StoreResult<DashboardStats>;
}

pub const MEMORY_URL: &str = "memory://";

pub async fn init_db_pool(db_url: &str, max_connections: u32) -> Result<PGPool, sqlx::Error> {
    let pool: PGPool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;
    info!("Connected to postgresql");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied");
    Ok(pool)
}

/// Picks the store named by `db_url`.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<Arc<dyn Store>, sqlx::Error> {
    if db_url == MEMORY_URL {
        warn!("using the in-memory store, nothing will survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let pool = init_db_pool(db_url, max_connections).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

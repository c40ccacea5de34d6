use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

/// Role strings arrive as "Admin", "admin", "ADMIN"... and are folded here,
/// nowhere else.
impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "abstract_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AbstractStatus {
    Pending,
    Approved,
    Rejected,
    Published,
}

impl AbstractStatus {
    pub const ALL: [AbstractStatus; 4] = [
        AbstractStatus::Pending,
        AbstractStatus::Approved,
        AbstractStatus::Rejected,
        AbstractStatus::Published,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AbstractStatus::Pending => "pending",
            AbstractStatus::Approved => "approved",
            AbstractStatus::Rejected => "rejected",
            AbstractStatus::Published => "published",
        }
    }
}

impl fmt::Display for AbstractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbstractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AbstractStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status '{}'", s.trim()))
    }
}

/// Research fields an abstract may be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "research_field")]
pub enum Field {
    #[sqlx(rename = "Public Health")]
    #[serde(rename = "Public Health")]
    PublicHealth,
    #[sqlx(rename = "AI")]
    #[serde(rename = "AI")]
    Ai,
    Technology,
    Agriculture,
    #[sqlx(rename = "Mining Engineering")]
    #[serde(rename = "Mining Engineering")]
    MiningEngineering,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::PublicHealth,
        Field::Ai,
        Field::Technology,
        Field::Agriculture,
        Field::MiningEngineering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::PublicHealth => "Public Health",
            Field::Ai => "AI",
            Field::Technology => "Technology",
            Field::Agriculture => "Agriculture",
            Field::MiningEngineering => "Mining Engineering",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let allowed: Vec<&str> = Field::ALL.iter().map(Field::as_str).collect();
                format!("field must be one of: {}", allowed.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Abstract {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub field: Field,
    pub institution: String,
    pub country: String,
    pub year: i32,
    pub keywords: Option<String>,
    pub status: AbstractStatus,
    pub author_id: i64,
    pub date_submitted: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub abstract_id: i64,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_id: String,
    pub checkout_url: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub abstract_id: i64,
    pub payment_id: Option<i64>,
    pub generated_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub checkout_url: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub abstract_id: i64,
    pub admin_id: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Star rating of the portal itself, left by anyone.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub user_id: Option<i64>,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

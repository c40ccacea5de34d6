use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::{
    db::{AbstractChanges, AbstractFilter, NewAbstract, RatingStats, ReviewEntry},
    errors::AppError,
    models::{Abstract, AbstractStatus, Feedback, Field, Invoice, Notification, Payment, User},
};

pub const MAX_PAGE_SIZE: i64 = 100;
pub const MIN_YEAR: i32 = 1900;

fn trimmed<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(String::deserialize(de)?.trim().to_string())
}

fn trimmed_opt<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(de)?.map(|v| v.trim().to_string()))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_field(raw: &str) -> Result<Field, AppError> {
    raw.trim().parse::<Field>().map_err(AppError::validation)
}

/// The ceiling moves with the calendar, so it cannot live in an attribute.
fn check_year_ceiling(year: i32, now: DateTime<Utc>) -> Result<i32, AppError> {
    let max = now.year() + 1;
    if year <= max {
        Ok(year)
    } else {
        Err(AppError::validation(format!("year must be between {MIN_YEAR} and {max}")))
    }
}

fn passwords_match(dto: &NewUserDto) -> Result<(), ValidationError> {
    match &dto.confirm_password {
        Some(confirm) if confirm != &dto.password => {
            Err(ValidationError::new("password_mismatch").with_message("passwords do not match".into()))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[validate(schema(function = "passwords_match"))]
pub struct NewUserDto {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 128, message = "fullname must be 1 to 128 characters"))]
    pub fullname: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        email(message = "a valid email address is required"),
        length(max = 128, message = "email must be at most 128 characters")
    )]
    pub email: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 64, message = "country must be 1 to 64 characters"))]
    pub country: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidUser {
    pub fullname: String,
    pub email: String,
    pub country: String,
    pub password: String,
}

impl NewUserDto {
    pub fn into_user(self) -> Result<ValidUser, AppError> {
        self.validate()?;
        Ok(ValidUser {
            fullname: self.fullname,
            email: self.email.to_lowercase(),
            country: self.country,
            password: self.password,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoginUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForgotPasswordDto {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ResetPasswordDto {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "invalid or expired reset token"))]
    pub token: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct NewAbstractDto {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 256, message = "title must be 1 to 256 characters"))]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "field is required"))]
    pub field: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 128, message = "institution must be 1 to 128 characters"))]
    pub institution: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 64, message = "country must be 1 to 64 characters"))]
    pub country: String,
    #[validate(
        required(message = "year is required"),
        range(min = 1900, message = "year must not be before 1900")
    )]
    pub year: Option<i32>,
    #[validate(length(max = 256, message = "keywords must be at most 256 characters"))]
    pub keywords: Option<String>,
    pub author_id: Option<i64>,
}

impl NewAbstractDto {
    pub fn into_new_abstract(self, author_id: i64, now: DateTime<Utc>) -> Result<NewAbstract, AppError> {
        if self.author_id.is_some_and(|id| id != author_id) {
            return Err(AppError::forbidden("author_id does not match the signed-in user"));
        }
        self.validate()?;
        let field = parse_field(&self.field)?;
        let year = check_year_ceiling(
            self.year.ok_or_else(|| AppError::validation("year is required"))?,
            now,
        )?;
        Ok(NewAbstract {
            title: self.title,
            content: self.content,
            field,
            institution: self.institution,
            country: self.country,
            year,
            keywords: optional_text(self.keywords),
            author_id,
            date_submitted: now,
        })
    }
}

/// Any subset of the abstract's fields, for resubmission.
#[derive(Debug, Deserialize, Clone, Default, Validate)]
pub struct UpdateAbstractDto {
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 256, message = "title must be 1 to 256 characters"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, message = "content must not be blank"))]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, message = "field must not be blank"))]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 128, message = "institution must be 1 to 128 characters"))]
    pub institution: Option<String>,
    #[serde(default, deserialize_with = "trimmed_opt")]
    #[validate(length(min = 1, max = 64, message = "country must be 1 to 64 characters"))]
    pub country: Option<String>,
    #[validate(range(min = 1900, message = "year must not be before 1900"))]
    pub year: Option<i32>,
    #[validate(length(max = 256, message = "keywords must be at most 256 characters"))]
    pub keywords: Option<String>,
}

impl UpdateAbstractDto {
    pub fn into_changes(self, now: DateTime<Utc>) -> Result<AbstractChanges, AppError> {
        self.validate()?;
        Ok(AbstractChanges {
            field: self.field.as_deref().map(parse_field).transpose()?,
            year: self.year.map(|y| check_year_ceiling(y, now)).transpose()?,
            title: self.title,
            content: self.content,
            institution: self.institution,
            country: self.country,
            keywords: optional_text(self.keywords),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewAbstractDto {
    #[serde(default)]
    pub action: String,
    pub feedback: Option<String>,
    pub admin_id: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AbstractQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub field: Option<String>,
    pub country: Option<String>,
    pub year: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AbstractQuery {
    /// Status filtering is the caller's decision; only the other filters
    /// are read here.
    pub fn to_filter(&self) -> Result<AbstractFilter, AppError> {
        let defaults = AbstractFilter::default();
        Ok(AbstractFilter {
            status: None,
            field: optional_text(self.field.clone())
                .map(|f| parse_field(&f))
                .transpose()?,
            country: optional_text(self.country.clone()),
            year: self.year,
            author_id: None,
            text: optional_text(self.q.clone()),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }

    pub fn requested_status(&self) -> Result<Option<AbstractStatus>, AppError> {
        optional_text(self.status.clone())
            .map(|s| s.parse::<AbstractStatus>().map_err(AppError::validation))
            .transpose()
    }
}

#[derive(Debug, Serialize)]
pub struct AbstractResponse {
    pub message: String,
    #[serde(rename = "abstract")]
    pub abstract_: Abstract,
}

#[derive(Debug, Serialize)]
pub struct AbstractDetail {
    #[serde(flatten)]
    pub abstract_: Abstract,
    pub feedback: Vec<Feedback>,
}

#[derive(Debug, Serialize)]
pub struct AbstractList {
    pub abstracts: Vec<Abstract>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub message: String,
    #[serde(rename = "abstract")]
    pub abstract_: Abstract,
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InitiatePaymentDto {
    pub abstract_id: i64,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub message: String,
    pub checkout_url: String,
    pub tx_ref: String,
    pub payment_id: i64,
    pub invoice_id: i64,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfirmPaymentDto {
    pub payment_id: Option<i64>,
    pub tx_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub message: String,
    pub already_confirmed: bool,
    pub payment: Payment,
    pub invoice: Option<Invoice>,
    #[serde(rename = "abstract")]
    pub abstract_: Abstract,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CallbackQuery {
    pub tx_ref: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub message: String,
    pub tx_ref: String,
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct UserDashboard {
    pub user: User,
    pub abstracts: Vec<AbstractDetail>,
    pub payments: Vec<Payment>,
    pub notifications: Vec<Notification>,
    pub unread_notifications: usize,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct NewReviewDto {
    #[validate(
        required(message = "rating is required"),
        range(min = 1, max = 5, message = "rating must be between 1 and 5")
    )]
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

impl NewReviewDto {
    pub fn into_rating(self) -> Result<(i32, Option<String>), AppError> {
        self.validate()?;
        let rating = self
            .rating
            .ok_or_else(|| AppError::validation("rating is required"))?;
        Ok((rating as i32, optional_text(self.comment)))
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewList {
    pub reviews: Vec<ReviewEntry>,
    pub stats: RatingStats,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ContactDto {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 128, message = "name must be 1 to 128 characters"))]
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        email(message = "a valid email address is required"),
        length(max = 128, message = "email must be at most 128 characters")
    )]
    pub email: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 5000, message = "message must be 1 to 5000 characters"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

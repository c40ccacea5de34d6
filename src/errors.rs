use actix_web::{
    error,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use derive_more::{Display, Error};
use log::{error, warn};

use crate::{db::StoreError, lifecycle::InvalidTransition};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display(fmt = "internal error")]
    InternalError,

    #[display(fmt = "{}", message)]
    Validation { message: String },

    #[display(fmt = "authentication required")]
    AuthError,

    #[display(fmt = "invalid credentials")]
    InvalidCredentials,

    #[display(fmt = "invalid token")]
    DecodeError,

    #[display(fmt = "session expired")]
    TokenExpirationError,

    #[display(fmt = "{}", message)]
    Forbidden { message: String },

    #[display(fmt = "{} not found", resource)]
    NotFound { resource: String },

    #[display(fmt = "{}", message)]
    Conflict { message: String },

    #[display(fmt = "payment gateway error: {}", message)]
    Gateway { message: String },

    #[display(fmt = "database error: {}", message)]
    Database { message: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound { resource: resource.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict { message: message.into() }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        AppError::Gateway { message: message.into() }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl error::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} {}", status.as_u16(), self);
        } else {
            warn!("{} {}", status.as_u16(), self);
        }
        // storage details stay in the log
        let message = match self {
            AppError::Database { .. } => AppError::InternalError.to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .json(ErrorBody { error: message })
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            AppError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthError => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::DecodeError => StatusCode::UNAUTHORIZED,
            AppError::TokenExpirationError => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Gateway { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity } => AppError::not_found(entity),
            StoreError::Duplicate { constraint } if constraint.contains("email") => {
                AppError::conflict("email is already registered")
            }
            StoreError::Duplicate { constraint } => {
                AppError::conflict(format!("duplicate value violates {constraint}"))
            }
            StoreError::InvalidState { message } => AppError::Conflict { message },
            other => AppError::Database { message: other.to_string() },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation { message: err.to_string() }
    }
}

impl From<InvalidTransition> for AppError {
    fn from(err: InvalidTransition) -> Self {
        AppError::conflict(err.to_string())
    }
}

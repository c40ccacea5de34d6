use std::{env, fmt::Display, ops::RangeInclusive, str::FromStr};

use log::info;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub password_reset_ttl_minutes: i64,
    pub publication_fee: f64,
    pub publication_currency: String,
    pub invoice_due_days: i64,
    pub paychangu_secret: Option<String>,
    pub paychangu_base_url: String,
    pub gateway_timeout_secs: u64,
    pub api_base_url: String,
    pub frontend_url: String,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_default_sender: String,
    pub mail_suppress_send: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| AppError::validation(format!("environment variable {key} must be set")))
        };

        let mail_default_sender = get("MAIL_DEFAULT_SENDER")
            .unwrap_or_else(|| "no-reply@localhost".to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_within(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5, 1..=100)?,
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            jwt_secret: required("JWT_SECRET")?,
            session_ttl_hours: parse_within(get("SESSION_TTL_HOURS"), "SESSION_TTL_HOURS", 24 * 7, 1..=24 * 365)?,
            password_reset_ttl_minutes: parse_within(
                get("PASSWORD_RESET_TTL_MINUTES"),
                "PASSWORD_RESET_TTL_MINUTES",
                5,
                1..=24 * 60,
            )?,
            publication_fee: parse_within(get("PUBLICATION_FEE"), "PUBLICATION_FEE", 1.99, 0.01..=1_000_000.0)?,
            publication_currency: get("PUBLICATION_CURRENCY")
                .unwrap_or_else(|| "USD".to_string())
                .to_ascii_uppercase(),
            invoice_due_days: parse_within(get("INVOICE_DUE_DAYS"), "INVOICE_DUE_DAYS", 7, 1..=365)?,
            paychangu_secret: get("PAYCHANGU_SECRET"),
            paychangu_base_url: get("PAYCHANGU_BASE_URL")
                .unwrap_or_else(|| "https://api.paychangu.com".to_string()),
            gateway_timeout_secs: parse_within(get("GATEWAY_TIMEOUT_SECS"), "GATEWAY_TIMEOUT_SECS", 30, 1..=300)?,
            api_base_url: trim_slash(get("API_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string())),
            frontend_url: trim_slash(get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string())),
            mail_api_url: get("MAIL_API_URL"),
            mail_api_key: get("MAIL_API_KEY"),
            mail_default_sender,
            mail_suppress_send: parse_flag(get("MAIL_SUPPRESS_SEND")),
            admin_email: get("ADMIN_EMAIL").map(|e| e.to_lowercase()),
            admin_password: get("ADMIN_PASSWORD"),
        })
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn log_summary(&self) {
        info!(
            "config: bind {}:{}, fee {} {}, gateway {}, mail {}",
            self.host,
            self.port,
            self.publication_fee,
            self.publication_currency,
            if self.paychangu_secret.is_some() { "enabled" } else { "disabled" },
            match (&self.mail_api_url, self.mail_suppress_send) {
                (_, true) => "suppressed",
                (Some(_), false) => "relay",
                (None, false) => "log only",
            }
        );
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T::Err: Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::validation(format!("invalid {key} value '{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Durations built from these values must stay within what chrono can add
/// to a timestamp, so out-of-range numbers are refused at startup.
fn parse_within<T>(value: Option<String>, key: &str, default: T, range: RangeInclusive<T>) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Display,
    T::Err: Display,
{
    let parsed = parse_or(value, key, default)?;
    if range.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(AppError::validation(format!(
            "{key} must be between {} and {}, got {parsed}",
            range.start(),
            range.end()
        )))
    }
}

fn parse_flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "on" | "1" | "yes"))
        .unwrap_or(false)
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

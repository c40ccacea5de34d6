use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{config::Config, errors::AppError};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub tx_ref: String,
    pub amount: f64,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub callback_url: String,
    pub return_url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, AppError>;
    /// True only when the provider reports the transaction as settled.
    async fn verify(&self, tx_ref: &str) -> Result<bool, AppError>;
}

pub struct PayChanguGateway {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

#[derive(Serialize)]
struct Customization<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct PaymentPayload<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    callback_url: &'a str,
    return_url: &'a str,
    tx_ref: &'a str,
    customization: Customization<'a>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: Option<serde_json::Value>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    checkout_url: String,
    #[serde(default)]
    data: Option<CheckoutInner>,
}

#[derive(Debug, Deserialize)]
struct CheckoutInner {
    tx_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

fn is_success(status: &str) -> bool {
    status.eq_ignore_ascii_case("success")
}

fn describe(message: &Option<serde_json::Value>) -> String {
    match message {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "no message".to_string(),
    }
}

fn parse_checkout(body: &str, tx_ref: &str) -> Result<CheckoutSession, AppError> {
    let envelope: Envelope<CheckoutData> = serde_json::from_str(body)
        .map_err(|e| AppError::gateway(format!("unreadable checkout response: {}", e)))?;
    if !is_success(&envelope.status) {
        return Err(AppError::gateway(format!(
            "checkout refused: {}",
            describe(&envelope.message)
        )));
    }
    let data = envelope
        .data
        .ok_or_else(|| AppError::gateway("checkout response carries no data"))?;
    let reported = data.data.and_then(|inner| inner.tx_ref);
    if let Some(reported) = &reported {
        if reported != tx_ref {
            warn!("gateway answered tx_ref {} for {}", reported, tx_ref);
        }
    }
    Ok(CheckoutSession {
        checkout_url: data.checkout_url,
        tx_ref: reported.unwrap_or_else(|| tx_ref.to_string()),
    })
}

fn parse_verification(body: &str) -> Result<bool, AppError> {
    let envelope: Envelope<VerifyData> = serde_json::from_str(body)
        .map_err(|e| AppError::gateway(format!("unreadable verification response: {}", e)))?;
    Ok(is_success(&envelope.status)
        && envelope.data.map(|d| is_success(&d.status)).unwrap_or(false))
}

impl PayChanguGateway {
    pub fn new(base_url: String, secret: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            error!("failed to build gateway client: {}", e);
            AppError::InternalError
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        })
    }
}

#[async_trait]
impl PaymentGateway for PayChanguGateway {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, AppError> {
        let payload = PaymentPayload {
            amount: format!("{:.2}", request.amount),
            currency: &request.currency,
            email: &request.email,
            first_name: &request.first_name,
            last_name: &request.last_name,
            callback_url: &request.callback_url,
            return_url: &request.return_url,
            tx_ref: &request.tx_ref,
            customization: Customization {
                title: &request.title,
                description: &request.description,
            },
        };
        let res = self
            .client
            .post(format!("{}/payment", self.base_url))
            .bearer_auth(&self.secret)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("checkout request failed: {}", e)))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("checkout response unreadable: {}", e)))?;
        if !status.is_success() {
            return Err(AppError::gateway(format!("checkout answered {}: {}", status, body)));
        }
        let session = parse_checkout(&body, &request.tx_ref)?;
        info!("checkout created for {}", session.tx_ref);
        Ok(session)
    }

    async fn verify(&self, tx_ref: &str) -> Result<bool, AppError> {
        let res = self
            .client
            .get(format!("{}/verify-payment/{}", self.base_url, tx_ref))
            .bearer_auth(&self.secret)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("verification request failed: {}", e)))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("verification response unreadable: {}", e)))?;
        if !status.is_success() {
            warn!("verification of {} answered {}", tx_ref, status);
            return Ok(false);
        }
        parse_verification(&body)
    }
}

/// Stand-in when no gateway secret is configured.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_checkout(&self, _request: CheckoutRequest) -> Result<CheckoutSession, AppError> {
        Err(AppError::gateway("payment gateway is not configured"))
    }

    async fn verify(&self, _tx_ref: &str) -> Result<bool, AppError> {
        Err(AppError::gateway("payment gateway is not configured"))
    }
}

pub fn gateway_from_config(config: &Config) -> Result<Arc<dyn PaymentGateway>, AppError> {
    match &config.paychangu_secret {
        Some(secret) => Ok(Arc::new(PayChanguGateway::new(
            config.paychangu_base_url.clone(),
            secret.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )?)),
        None => {
            warn!("PAYCHANGU_SECRET is not set, payments are disabled");
            Ok(Arc::new(DisabledGateway))
        }
    }
}

/// Splits a full name into the first/last pair the checkout form wants.
pub fn split_name(fullname: &str) -> (String, String) {
    let mut parts = fullname.split_whitespace();
    let first = parts.next().unwrap_or("").to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

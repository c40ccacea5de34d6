use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::{config::Config, errors::AppError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), AppError>;
}

/// Posts each message as JSON to a mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    sender: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, sender: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| {
                error!("failed to build mail client: {}", e);
                AppError::InternalError
            })?;
        Ok(Self { client, url, api_key, sender })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        let payload = RelayMessage {
            from: &self.sender,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
            html: &email.html,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("mail relay request failed: {}", e)))?;
        if !res.status().is_success() {
            return Err(AppError::gateway(format!("mail relay answered {}", res.status())));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        info!("mail to {}: {}", email.to, email.subject);
        debug!("{}", email.text);
        Ok(())
    }
}

pub fn mailer_from_config(config: &Config) -> Result<Arc<dyn Mailer>, AppError> {
    match (&config.mail_api_url, config.mail_suppress_send) {
        (Some(url), false) => Ok(Arc::new(HttpMailer::new(
            url.clone(),
            config.mail_api_key.clone(),
            config.mail_default_sender.clone(),
        )?)),
        _ => Ok(Arc::new(LogMailer)),
    }
}

/// Handle the request path uses to hand email to the background worker.
#[derive(Clone)]
pub struct Dispatcher {
    tx: UnboundedSender<Email>,
}

impl Dispatcher {
    pub fn channel() -> (Self, UnboundedReceiver<Email>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never fails the caller; a closed queue only costs a log line.
    pub fn dispatch(&self, email: Email) {
        let subject = email.subject.clone();
        if self.tx.send(email).is_err() {
            warn!("mail worker is gone, dropping '{}'", subject);
        }
    }
}

/// Sends every queued message on its own task until `shutdown` fires or
/// every [`Dispatcher`] is dropped.
pub fn spawn_worker(
    mailer: Arc<dyn Mailer>,
    mut rx: UnboundedReceiver<Email>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("mail worker stopping");
                    break;
                }
                next = rx.recv() => match next {
                    Some(email) => {
                        let mailer = mailer.clone();
                        tokio::spawn(async move {
                            if let Err(err) = mailer.send(&email).await {
                                error!("failed to send '{}' to {}: {}", email.subject, email.to, err);
                            }
                        });
                    }
                    None => break,
                },
            }
        }
    })
}

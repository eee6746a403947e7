//! Contact form mail relay.
//!
//! Messages are handed to an HTTP mail relay as JSON. Without a configured
//! relay the message is only logged, which keeps local setups working.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),
}

/// Notification sent to the company inbox for each contact submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub from: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
}

impl ContactMessage {
    /// Build the notification from already sanitized form fields.
    pub fn from_submission(config: &MailConfig, name: &str, email: &str, message: &str) -> Self {
        Self {
            from: config.from.clone(),
            to: config.to.clone(),
            reply_to: email.to_string(),
            subject: format!("New Message from Client {}", name),
            text: format!("Name: {}\nEmail: {}\nMessage: {}", name, email, message),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Mailer {
    /// POST each message to a relay endpoint
    Webhook { client: reqwest::Client, url: String },
    /// Log messages instead of sending them
    Log,
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        match &config.relay_url {
            Some(url) => Self::webhook(url.clone()),
            None => {
                tracing::warn!("No mail relay configured (SITE_MAIL_RELAY_URL). Contact messages will only be logged!");
                Ok(Mailer::Log)
            }
        }
    }

    pub fn webhook(url: impl Into<String>) -> Result<Self, MailError> {
        Self::webhook_with_timeout(url, RELAY_TIMEOUT)
    }

    /// Relay client whose requests give up after `timeout`.
    pub fn webhook_with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Mailer::Webhook {
            client,
            url: url.into(),
        })
    }

    pub async fn send(&self, message: &ContactMessage) -> Result<(), MailError> {
        match self {
            Mailer::Webhook { client, url } => {
                let resp = client.post(url).json(message).send().await?;
                if !resp.status().is_success() {
                    return Err(MailError::Rejected(resp.status().as_u16()));
                }
                tracing::info!(to = %message.to, "contact message relayed");
                Ok(())
            }
            Mailer::Log => {
                tracing::info!(
                    to = %message.to,
                    subject = %message.subject,
                    "contact message (not relayed): {}",
                    message.text
                );
                Ok(())
            }
        }
    }
}

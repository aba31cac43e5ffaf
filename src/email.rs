//! Outbound email through a black-box relay.
//!
//! The boundary only guarantees `send(message) -> Result<receipt>`; transport
//! details live behind the `Mailer` trait. The production implementation
//! posts JSON to a configured relay endpoint.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MailRelayConfig;
use crate::error::{PermitDeskError, Result};

/// An attachment carried inline as base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_base64: String,
}

/// A message handed to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Acknowledgement that the relay accepted a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> BoxFuture<'_, Result<DeliveryReceipt>>;
}

/// Production mailer: posts messages to an HTTP relay.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpMailer {
    pub fn new(config: &MailRelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            token: config.token.clone(),
        }
    }
}

impl Mailer for HttpMailer {
    fn send(&self, message: &EmailMessage) -> BoxFuture<'_, Result<DeliveryReceipt>> {
        let message = message.clone();
        Box::pin(async move {
            validate_message(&message)?;

            let mut request = self.client.post(&self.url).json(&message);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(PermitDeskError::Email(format!(
                    "Relay returned {}: {}",
                    status, body
                )));
            }

            tracing::info!(to = %message.to, subject = %message.subject, "Email accepted by relay");

            Ok(DeliveryReceipt {
                message_id: Uuid::new_v4().to_string(),
                accepted_at: Utc::now(),
            })
        })
    }
}

/// Mailer that refuses every message; used when no relay is configured.
pub struct DisabledMailer;

impl Mailer for DisabledMailer {
    fn send(&self, _message: &EmailMessage) -> BoxFuture<'_, Result<DeliveryReceipt>> {
        Box::pin(async {
            Err(PermitDeskError::Email(
                "Outbound mail is not configured".to_string(),
            ))
        })
    }
}

/// Test double: records messages instead of sending them, optionally failing.
pub struct RecordingMailer {
    sent: tokio::sync::Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: tokio::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A recorder that fails every send.
    pub fn failing() -> Self {
        Self {
            sent: tokio::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages recorded so far.
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

impl Default for RecordingMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &EmailMessage) -> BoxFuture<'_, Result<DeliveryReceipt>> {
        let message = message.clone();
        Box::pin(async move {
            validate_message(&message)?;

            if self.fail {
                return Err(PermitDeskError::Email("relay unavailable".to_string()));
            }

            self.sent.lock().await.push(message);
            Ok(DeliveryReceipt {
                message_id: Uuid::new_v4().to_string(),
                accepted_at: Utc::now(),
            })
        })
    }
}

fn validate_message(message: &EmailMessage) -> Result<()> {
    let to = message.to.trim();
    if to.is_empty() || !to.contains('@') {
        return Err(PermitDeskError::Validation(
            "recipient must be a valid address".to_string(),
        ));
    }
    if message.subject.trim().is_empty() {
        return Err(PermitDeskError::Validation(
            "subject must not be empty".to_string(),
        ));
    }
    Ok(())
}

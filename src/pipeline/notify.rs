//! Notification delivery
//!
//! Delivery is fire-and-forget from the engine's point of view: a failed
//! delivery is logged by the caller and never retried, because the alert key
//! was already recorded before the attempt.

use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, subject: &str, body: &str, recipient: &str) -> Result<()>;
}

/// Writes deliveries to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        log::info!("📧 [{}] {}", recipient, subject);
        log::debug!("{}", body);
        Ok(())
    }
}

/// Posts each delivery as JSON to a webhook (mail relay, chat bridge, ...)
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MonitorError::Config(format!("webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        let payload = serde_json::json!({
            "recipient": recipient,
            "subject": subject,
            "body": body,
        });

        let delivery_error = |reason: String| MonitorError::Delivery {
            recipient: recipient.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(delivery_error(format!("webhook returned {}", response.status())));
        }

        log::info!("📧 Delivered \"{}\" to {}", subject, recipient);
        Ok(())
    }
}

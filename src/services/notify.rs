//! Completion notification sent after a finished report is fetched.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppError;
use crate::services::mail::MailRequest;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn audit_completed(
        &self,
        email: &str,
        audit_id: &str,
        download_url: &str,
    ) -> Result<(), AppError>;
}

/// Posts to the mail dispatcher endpoint (`/api/send-audit-email`).
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn audit_completed(
        &self,
        email: &str,
        audit_id: &str,
        download_url: &str,
    ) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(&MailRequest {
                to: Some(email.to_string()),
                audit_id: Some(audit_id.to_string()),
                download_url: Some(download_url.to_string()),
            })
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "Email failed".to_string());

        Err(AppError::Upstream { status, message })
    }
}

/// Notifier that does nothing; used when notifications are disabled.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn audit_completed(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }
}

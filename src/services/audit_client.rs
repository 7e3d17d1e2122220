//! HTTP client for the external audit API.
//!
//! Endpoints:
//! - `POST {API}/audit` with `{wallet, code, email}` → `{status: "processing", auditId}`
//! - `POST {API}/status/{id}` → `{status}`
//! - `POST {API}/report/{id}` → full report JSON
//!
//! The bearer token is asked for on every request so a refreshed session is
//! picked up immediately.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::audit::{AuditReport, AuditStatus, AuditSubmission, RawReport, StatusResponse, SubmitResponse};
use crate::services::notify::{NoopNotifier, Notifier};
use crate::services::report::{self, StorageLocation};

/// Supplies the caller's access token, if signed in.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

/// Fixed token, e.g. one forwarded from an incoming request.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Clone)]
pub struct AuditClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    storage: StorageLocation,
    notifier: Arc<dyn Notifier>,
}

impl AuditClient {
    pub fn new(http: reqwest::Client, base_url: &str, storage: StorageLocation) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: Arc::new(StaticToken::default()),
            storage,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Copy of this client that authenticates with a fixed token.
    pub fn for_token(&self, token: Option<String>) -> Self {
        self.clone().with_tokens(Arc::new(StaticToken(token)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit source code for auditing and return the new audit id.
    pub async fn submit(&self, submission: &AuditSubmission) -> Result<String, AppError> {
        submission.check().map_err(AppError::Validation)?;

        let body = serde_json::to_value(submission.normalized())
            .map_err(|e| AppError::Internal(format!("Failed to encode submission: {e}")))?;
        let response: SubmitResponse = self.post("audit", Some(&body)).await?;

        match (response.status.as_deref(), response.audit_id) {
            (Some("processing"), Some(id)) if !id.trim().is_empty() => {
                tracing::info!(audit_id = %id, "Audit submitted");
                Ok(id)
            }
            (status, _) => {
                tracing::warn!(status = ?status, "Audit submission not accepted");
                Err(AppError::Upstream {
                    status: StatusCode::OK.as_u16(),
                    message: "Audit submission failed: the service did not accept the request"
                        .to_string(),
                })
            }
        }
    }

    /// Current status of an audit job.
    pub async fn poll_status(&self, audit_id: &str) -> Result<AuditStatus, AppError> {
        let response: StatusResponse = self
            .post(&format!("status/{}", path_segment(audit_id)?), None)
            .await?;
        tracing::debug!(audit_id = %audit_id, status = %response.status, "Audit status");
        Ok(response.status)
    }

    /// Fetch the report; `None` while the audit is still running.
    ///
    /// On a completed report with both an email and a download URL, the
    /// completion email is sent. A failed notification is logged and does
    /// not fail the fetch.
    pub async fn fetch_report(&self, audit_id: &str) -> Result<Option<AuditReport>, AppError> {
        let raw: RawReport = self
            .post(&format!("report/{}", path_segment(audit_id)?), None)
            .await?;

        let Some(report) = report::map_report(audit_id, raw, &self.storage) else {
            return Ok(None);
        };

        if let (Some(email), Some(url)) = (report.email.as_deref(), report.download_url.as_deref()) {
            if let Err(e) = self.notifier.audit_completed(email, &report.id, url).await {
                tracing::warn!(audit_id = %report.id, error = %e, "Completion email failed");
            }
        }

        Ok(Some(report))
    }

    /// Reachability check: any HTTP answer from the base URL counts.
    pub async fn ping(&self) -> Result<(), AppError> {
        self.http.get(&self.base_url).send().await?;
        Ok(())
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.post(&url);
        if let Some(token) = self.tokens.access_token().await {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized,
                StatusCode::NOT_FOUND => AppError::NotFound(format!("{path} not found")),
                _ => AppError::Upstream {
                    status: status.as_u16(),
                    message: error_message(&bytes),
                },
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Schema(format!("Invalid response from {path}: {e}")))
    }
}

/// Reject ids that would change the request path.
fn path_segment(audit_id: &str) -> Result<&str, AppError> {
    let id = audit_id.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::Validation(format!("Invalid audit id '{audit_id}'")));
    }
    Ok(id)
}

/// Pull a message out of an upstream error body: `{"error": ...}`,
/// `{"message": ...}`, or raw text.
fn error_message(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        for key in ["error", "message", "msg"] {
            if let Some(msg) = json.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    String::from_utf8_lossy(body).chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segment_accepts_uuid_like_ids() {
        assert_eq!(path_segment(" 3f2a-9c_01 ").unwrap(), "3f2a-9c_01");
    }

    #[test]
    fn path_segment_rejects_traversal() {
        assert!(path_segment("../admin").is_err());
        assert!(path_segment("a/b").is_err());
        assert!(path_segment("").is_err());
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(error_message(br#"{"error":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(error_message(br#"{"message":"bad code"}"#), "bad code");
        assert_eq!(error_message(b"gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn static_token_returns_value() {
        let source = StaticToken(Some("abc".to_string()));
        assert_eq!(source.access_token().await.as_deref(), Some("abc"));
        assert_eq!(StaticToken::default().access_token().await, None);
    }

    #[tokio::test]
    async fn blank_code_is_rejected_before_any_request() {
        // Port 9 (discard) is never contacted: validation fails first.
        let client = AuditClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            StorageLocation {
                base_url: "http://127.0.0.1:9".to_string(),
                bucket: "audit-reports".to_string(),
            },
        );
        let result = client
            .submit(&AuditSubmission {
                wallet: String::new(),
                code: String::new(),
                email: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

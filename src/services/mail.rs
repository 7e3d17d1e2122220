//! Audit-complete mail dispatch behind a single configurable transport.
//!
//! Requests are validated before any transport call. Identical requests
//! (same recipient, audit id and download URL) inside the suppression window
//! are acknowledged without sending a second message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::{MailConfig, MailTransportKind};
use crate::errors::MailError;

/// Body accepted by `POST /api/send-audit-email`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub audit_id: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Fully rendered message handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Failure reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not configured: {0}")]
    NotConfigured(String),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Network(#[from] reqwest::Error),

    #[error("SMTP: {0}")]
    Smtp(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Short identifier used in logs and health output.
    fn name(&self) -> &'static str;

    /// Send one message. No retries: a failed send is reported as-is.
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError>;
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

/// Syntactic email shape check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(address: &str) -> bool {
    email_pattern().is_match(address)
}

/// Validated request fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMailRequest {
    pub to: String,
    pub audit_id: Option<String>,
    pub download_url: String,
}

/// Check required fields and address shape. The address is matched as
/// given: surrounding whitespace makes it invalid.
pub fn validate(request: &MailRequest) -> Result<ValidMailRequest, MailError> {
    let to = request.to.as_deref().unwrap_or_default();
    let download_url = request
        .download_url
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    if to.is_empty() || download_url.is_empty() {
        return Err(MailError::MissingFields);
    }
    if !is_valid_email(to) {
        return Err(MailError::InvalidEmail);
    }

    Ok(ValidMailRequest {
        to: to.to_string(),
        audit_id: request
            .audit_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        download_url: download_url.to_string(),
    })
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the "report ready" message.
pub fn render(request: &ValidMailRequest, product_name: &str) -> MailMessage {
    let audit_id = request.audit_id.as_deref().unwrap_or("N/A");
    let html = format!(
        "<p>Hey,</p>\
         <p>Your smart contract audit is complete! You can download the report below:</p>\
         <p><a href=\"{url}\" target=\"_blank\">Download Audit Report</a></p>\
         <br />\
         <p>Thanks for using {product}</p>",
        url = escape_html(&request.download_url),
        product = escape_html(product_name),
    );

    MailMessage {
        to: request.to.clone(),
        subject: format!("Your Audit Report [Audit ID: {audit_id}]"),
        html,
    }
}

/// Fingerprint used for duplicate suppression.
fn fingerprint(request: &ValidMailRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}:{}:{}",
            request.to.to_lowercase(),
            request.audit_id.as_deref().unwrap_or_default(),
            request.download_url
        )
        .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Identical request already sent inside the suppression window.
    Suppressed,
}

/// Suppression state of one fingerprint.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Sending,
    SentAt(Instant),
}

/// Validates, renders and relays audit mail.
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    product_name: String,
    window: Duration,
    recent: Mutex<HashMap<String, Slot>>,
}

/// Exclusive right to send one fingerprint. Released on drop unless the
/// send succeeded, so a failed or abandoned send can be retried at once.
struct Claim<'a> {
    mailer: &'a Mailer,
    key: Option<String>,
}

impl Claim<'_> {
    fn sent(mut self) {
        if let Some(key) = self.key.take() {
            self.mailer
                .slots()
                .insert(key, Slot::SentAt(Instant::now()));
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.mailer.slots().remove(&key);
        }
    }
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, product_name: &str, window: Duration) -> Self {
        Self {
            transport,
            product_name: product_name.to_string(),
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Validate and send one request.
    pub async fn dispatch(&self, request: &MailRequest) -> Result<DispatchOutcome, MailError> {
        let valid = validate(request)?;
        let key = fingerprint(&valid);

        let Some(claim) = self.claim(key) else {
            tracing::info!(
                audit_id = valid.audit_id.as_deref().unwrap_or("N/A"),
                "Duplicate audit email suppressed"
            );
            return Ok(DispatchOutcome::Suppressed);
        };

        let message = render(&valid, &self.product_name);
        match self.transport.send(&message).await {
            Ok(()) => {
                claim.sent();
                tracing::info!(
                    transport = self.transport.name(),
                    audit_id = valid.audit_id.as_deref().unwrap_or("N/A"),
                    "Audit email sent"
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(TransportError::NotConfigured(reason)) => {
                tracing::error!(transport = self.transport.name(), %reason, "Missing email credentials");
                Err(MailError::Configuration)
            }
            Err(e) => {
                tracing::error!(transport = self.transport.name(), error = %e, "Email send failed");
                Err(MailError::SendFailed(e.to_string()))
            }
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve `key` for sending. `None` when the same message is being sent
    /// right now or was sent inside the window.
    fn claim(&self, key: String) -> Option<Claim<'_>> {
        if self.window.is_zero() {
            return Some(Claim { mailer: self, key: None });
        }

        let mut slots = self.slots();
        let now = Instant::now();
        slots.retain(|_, slot| match slot {
            Slot::Sending => true,
            Slot::SentAt(at) => now.duration_since(*at) < self.window,
        });
        if slots.contains_key(&key) {
            return None;
        }
        slots.insert(key.clone(), Slot::Sending);
        Some(Claim {
            mailer: self,
            key: Some(key),
        })
    }
}

// -- Transports --

/// Authenticated SMTP submission, e.g. Gmail with an app password.
/// Port 465 uses implicit TLS, any other port STARTTLS.
pub struct SmtpTransport {
    mailer: Result<(AsyncSmtpTransport<Tokio1Executor>, Mailbox), String>,
}

impl SmtpTransport {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            mailer: Self::build(config),
        }
    }

    fn build(config: &MailConfig) -> Result<(AsyncSmtpTransport<Tokio1Executor>, Mailbox), String> {
        let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) else {
            return Err("EMAIL_USER and EMAIL_PASSWORD are required".to_string());
        };

        let address: Address = config
            .from_address
            .as_deref()
            .unwrap_or(username.as_str())
            .parse()
            .map_err(|e| format!("invalid sender address: {e}"))?;
        let sender = Mailbox::new(Some(config.from_name.clone()), address);

        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| format!("invalid SMTP host {}: {e}", config.smtp_host))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();
        Ok((transport, sender))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        let (transport, sender) = self
            .mailer
            .as_ref()
            .map_err(|reason| TransportError::NotConfigured(reason.clone()))?;

        let recipient: Mailbox = message
            .to
            .parse()
            .map_err(|e| TransportError::Smtp(format!("invalid recipient: {e}")))?;
        let email = Message::builder()
            .from(sender.clone())
            .to(recipient)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Brevo transactional email HTTP API.
pub struct BrevoTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    sender_name: String,
    sender_email: Option<String>,
}

impl BrevoTransport {
    pub fn new(client: reqwest::Client, config: &MailConfig) -> Self {
        Self {
            client,
            api_url: config.brevo_api_url.clone(),
            api_key: config.brevo_api_key.clone(),
            sender_name: config.from_name.clone(),
            sender_email: config.from_address.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for BrevoTransport {
    fn name(&self) -> &'static str {
        "brevo"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        let (Some(api_key), Some(sender_email)) = (&self.api_key, &self.sender_email) else {
            return Err(TransportError::NotConfigured(
                "BREVO_API_KEY and EMAIL_FROM are required".to_string(),
            ));
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", api_key)
            .json(&json!({
                "sender": { "name": self.sender_name, "email": sender_email },
                "to": [{ "email": message.to }],
                "subject": message.subject,
                "htmlContent": message.html,
            }))
            .send()
            .await?;

        reject_unless_success(response).await
    }
}

/// Separate mail microservice accepting `{to, subject, html}`.
pub struct RelayTransport {
    client: reqwest::Client,
    url: Option<String>,
}

impl RelayTransport {
    pub fn new(client: reqwest::Client, url: Option<String>) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| TransportError::NotConfigured("MAIL_RELAY_URL is required".to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&json!({
                "to": message.to,
                "subject": message.subject,
                "html": message.html,
            }))
            .send()
            .await?;

        reject_unless_success(response).await
    }
}

/// Development transport: logs the message instead of sending it.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        tracing::info!(to = %message.to, subject = %message.subject, "Mail (log transport)");
        Ok(())
    }
}

async fn reject_unless_success(response: reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Build the transport selected by configuration.
pub fn transport_from_config(client: reqwest::Client, config: &MailConfig) -> Arc<dyn MailTransport> {
    match config.transport {
        MailTransportKind::Smtp => Arc::new(SmtpTransport::new(config)),
        MailTransportKind::Brevo => Arc::new(BrevoTransport::new(client, config)),
        MailTransportKind::Relay => Arc::new(RelayTransport::new(client, config.relay_url.clone())),
        MailTransportKind::Log => Arc::new(LogTransport),
    }
}

//! Shared fixtures: an in-process stand-in for the external audit API and
//! helpers to build the application against it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use auditwolf::config::{
    AppConfig, IdentityBackend, MailConfig, MailTransportKind, PollConfig,
};
use auditwolf::services::audit_client::AuditClient;
use auditwolf::services::auth::LocalIdentityProvider;
use auditwolf::services::dashboard::AuditStore;
use auditwolf::services::mail::{MailMessage, MailTransport, Mailer, TransportError};
use auditwolf::services::notify::HttpNotifier;
use auditwolf::services::report::StorageLocation;
use auditwolf::AppState;

pub const STORAGE_BASE: &str = "https://proj.supabase.co";
pub const BUCKET: &str = "audit-reports";

/// Scripted audit backend.
#[derive(Default)]
pub struct FakeAuditApi {
    pub statuses: Mutex<VecDeque<&'static str>>,
    pub submit_response: Mutex<Option<Value>>,
    pub submissions: Mutex<Vec<Value>>,
    pub status_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub authorization: Mutex<Vec<Option<String>>>,
    pub notifications: Mutex<Vec<Value>>,
}

impl FakeAuditApi {
    pub fn with_statuses(statuses: &[&'static str]) -> Arc<Self> {
        let api = Self::default();
        *api.statuses.lock().unwrap() = statuses.iter().copied().collect();
        Arc::new(api)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn report_calls(&self) -> usize {
        self.report_calls.load(Ordering::SeqCst)
    }

    /// Current status without consuming the script.
    fn peek_status(&self) -> &'static str {
        self.statuses
            .lock()
            .unwrap()
            .front()
            .copied()
            .unwrap_or("pending")
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.authorization.lock().unwrap().push(auth);
    }
}

async fn submit(
    State(api): State<Arc<FakeAuditApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    api.record_auth(&headers);
    api.submissions.lock().unwrap().push(body);
    let response = api
        .submit_response
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| json!({"status": "processing", "auditId": "audit-123"}));
    Json(response)
}

async fn status(
    State(api): State<Arc<FakeAuditApi>>,
    headers: HeaderMap,
    Path(_id): Path<String>,
) -> Json<Value> {
    api.record_auth(&headers);
    api.status_calls.fetch_add(1, Ordering::SeqCst);
    let mut statuses = api.statuses.lock().unwrap();
    // The last scripted status sticks.
    let status = if statuses.len() > 1 {
        statuses.pop_front().unwrap_or("pending")
    } else {
        statuses.front().copied().unwrap_or("pending")
    };
    Json(json!({ "status": status }))
}

async fn report(
    State(api): State<Arc<FakeAuditApi>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Json<Value> {
    api.record_auth(&headers);
    api.report_calls.fetch_add(1, Ordering::SeqCst);
    let status = api.peek_status();
    if status != "completed" {
        return Json(json!({ "status": status }));
    }
    Json(json!({
        "status": "completed",
        "email": "dev@example.com",
        "wallet": "0x742d35Cc6482C06F25c85Dd7a630B95b9e123456",
        "createdAt": "2025-01-05T10:30:00Z",
        "completedAt": "2025-01-05T10:32:15Z",
        "auditJson": [
            {"line": 45, "issue": "Reentrancy vulnerability", "severity": "critical",
             "recommendation": "Use a reentrancy guard", "category": "Security"},
            {"line": 92, "issue": "Missing access control", "severity": "medium",
             "recommendation": "Restrict with Ownable", "category": "Access Control"}
        ],
        "gasOptimizations": {
            "suggestions": [{"line": 12, "description": "Cache array length", "estimatedSavings": 300}],
            "estimatedGas": 2450000
        },
        "pdfUrl": format!("reports/{id}.pdf")
    }))
}

async fn notify(State(api): State<Arc<FakeAuditApi>>, Json(body): Json<Value>) -> Json<Value> {
    api.notifications.lock().unwrap().push(body);
    Json(json!({"success": true}))
}

async fn unavailable() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
}

/// Serve a router on a random local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

/// Start the fake audit API; notifications are accepted at `/notify`.
pub async fn start_fake_api(api: Arc<FakeAuditApi>) -> String {
    let app = Router::new()
        .route("/audit", post(submit))
        .route("/status/{id}", post(status))
        .route("/report/{id}", post(report))
        .route("/notify", post(notify))
        .with_state(api);
    serve(app).await
}

/// Audit API that answers every status call with 503.
pub async fn start_unavailable_api() -> String {
    let app = Router::new().route("/status/{id}", post(unavailable));
    serve(app).await
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(40),
        multiplier: 2.0,
        max_attempts: 50,
        max_elapsed: Duration::from_secs(10),
        max_transport_failures: 3,
    }
}

pub fn storage() -> StorageLocation {
    StorageLocation {
        base_url: STORAGE_BASE.to_string(),
        bucket: BUCKET.to_string(),
    }
}

pub fn client(base_url: &str) -> AuditClient {
    let http = reqwest::Client::new();
    AuditClient::new(http.clone(), base_url, storage())
        .with_notifier(Arc::new(HttpNotifier::new(http, &format!("{base_url}/notify"))))
}

pub fn test_config(audit_api_url: &str) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: "http://localhost:5173".to_string(),
        audit_api_url: audit_api_url.to_string(),
        http_timeout: Duration::from_secs(5),
        supabase_url: STORAGE_BASE.to_string(),
        supabase_key: "anon-key".to_string(),
        storage_bucket: BUCKET.to_string(),
        identity_backend: IdentityBackend::Local,
        jwt_secret: "test-jwt-secret-for-integration-tests-only".to_string(),
        jwt_access_token_expiry_secs: 900,
        notify_url: format!("{audit_api_url}/notify"),
        mail: MailConfig {
            transport: MailTransportKind::Log,
            from_name: "Audit Wolf".to_string(),
            from_address: None,
            brevo_api_key: None,
            brevo_api_url: "http://127.0.0.1:9".to_string(),
            relay_url: None,
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 2525,
            smtp_username: None,
            smtp_password: None,
            dedup_window: Duration::ZERO,
        },
        poll: fast_poll(),
    }
}

/// Transport that records messages, optionally failing every send.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<MailMessage>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(TransportError::Rejected {
                status: 502,
                body: "provider down".to_string(),
            });
        }
        Ok(())
    }
}

/// Application state backed by the local identity provider and the given mail transport.
pub fn app_state(audit_api_url: &str, transport: Arc<dyn MailTransport>) -> AppState {
    let config = test_config(audit_api_url);
    let http = reqwest::Client::new();
    AppState {
        identity: Arc::new(
            LocalIdentityProvider::new(&config.jwt_secret, config.jwt_access_token_expiry_secs)
                .unwrap(),
        ),
        audits: client(audit_api_url),
        store: AuditStore::new(http, &config.supabase_url, &config.supabase_key, storage()),
        mailer: Arc::new(Mailer::new(transport, "Audit Wolf", config.mail.dedup_window)),
        config,
    }
}

// ──────────────────────────────────────────────────────────
// Generic recording upstream (mail providers, GoTrue, PostgREST)
// ──────────────────────────────────────────────────────────

/// One request as seen by [`RecordingUpstream`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Answers every request with one scripted response and records it.
pub struct RecordingUpstream {
    pub requests: Mutex<Vec<RecordedRequest>>,
    response: Mutex<(StatusCode, Value, Vec<(&'static str, String)>)>,
}

impl RecordingUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new((StatusCode::OK, json!({}), Vec::new())),
        })
    }

    pub fn respond(&self, status: StatusCode, body: Value) {
        *self.response.lock().unwrap() = (status, body, Vec::new());
    }

    pub fn respond_with_header(&self, status: StatusCode, body: Value, name: &'static str, value: &str) {
        *self.response.lock().unwrap() = (status, body, vec![(name, value.to_string())]);
    }

    pub fn last(&self) -> RecordedRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request recorded")
    }
}

async fn record(
    State(upstream): State<Arc<RecordingUpstream>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = uri
        .query()
        .map(|q| {
            reqwest::Url::parse(&format!("http://upstream/?{q}"))
                .unwrap()
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    upstream.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query,
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let (status, body, extra) = upstream.response.lock().unwrap().clone();
    let mut response = (status, Json(body)).into_response();
    for (name, value) in extra {
        response.headers_mut().insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).unwrap(),
        );
    }
    response
}

/// Start a [`RecordingUpstream`] and return its base URL.
pub async fn start_recording_upstream(upstream: Arc<RecordingUpstream>) -> String {
    serve(Router::new().fallback(record).with_state(upstream)).await
}

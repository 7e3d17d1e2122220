//! Health check endpoints for liveness and readiness.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

/// Readiness check detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub audit_api: String,
    pub identity_provider: String,
    pub mail_transport: String,
}

/// Liveness check — always returns OK if the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness check — checks that the audit API answers.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let (status, audit_api) = match state.audits.ping().await {
        Ok(()) => ("ok", "reachable".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Audit API health check failed");
            ("degraded", format!("error: {e}"))
        }
    };

    ApiResponse::success(HealthStatus {
        status: status.to_string(),
        audit_api,
        identity_provider: state.identity.name().to_string(),
        mail_transport: state.mailer.transport_name().to_string(),
    })
}

//! Mail dispatcher endpoint: `POST /api/send-audit-email`.
//!
//! Keeps the bare `{success}` / `{error}` bodies its callers expect rather
//! than the API envelope.

use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::errors::MailError;
use crate::services::mail::MailRequest;
use crate::AppState;

/// POST /api/send-audit-email
pub async fn send_audit_email(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, MailError> {
    let request: MailRequest =
        serde_json::from_slice(&body).map_err(|_| MailError::InvalidJson)?;

    state.mailer.dispatch(&request).await?;
    Ok(Json(json!({ "success": true })))
}

/// Any other method on the mail route.
pub async fn method_not_allowed() -> MailError {
    MailError::MethodNotAllowed
}

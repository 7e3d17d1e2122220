//! Audit job routes: submit, status, report.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::audit::{AuditReport, AuditStatus, AuditSubmission};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAudit {
    pub audit_id: String,
    pub status: AuditStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStatusResponse {
    pub audit_id: String,
    pub status: AuditStatus,
}

/// `ready: false` with no report while the audit is still running.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub ready: bool,
    pub report: Option<AuditReport>,
}

/// POST /api/v1/audits — submit source code; email defaults to the signed-in user's.
pub async fn submit(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(mut body): Json<AuditSubmission>,
) -> Result<Json<ApiResponse<SubmittedAudit>>, AppError> {
    if body.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
        body.email = Some(current_user.user.email.clone());
    }

    let audit_id = state
        .audits
        .for_token(Some(current_user.access_token))
        .submit(&body)
        .await?;

    Ok(ApiResponse::success(SubmittedAudit {
        audit_id,
        status: AuditStatus::Pending,
    }))
}

/// GET /api/v1/audits/{id}/status
pub async fn status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AuditStatusResponse>>, AppError> {
    let status = state
        .audits
        .for_token(Some(current_user.access_token))
        .poll_status(&id)
        .await?;

    Ok(ApiResponse::success(AuditStatusResponse {
        audit_id: id,
        status,
    }))
}

/// GET /api/v1/audits/{id}/report
pub async fn report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReportResponse>>, AppError> {
    let report = state
        .audits
        .for_token(Some(current_user.access_token))
        .fetch_report(&id)
        .await?;

    Ok(ApiResponse::success(ReportResponse {
        ready: report.is_some(),
        report,
    }))
}

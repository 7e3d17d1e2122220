//! Dashboard routes: past audits and aggregate statistics.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::pagination::{PagedResult, Pagination};
use crate::services::dashboard::{AuditSummary, DashboardStats, StatusFilter};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub status: StatusFilter,
}

/// GET /api/v1/audits — the caller's audits, newest first.
pub async fn list(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<ApiResponse<PagedResult<AuditSummary>>>, AppError> {
    let page = state
        .store
        .list(
            &current_user.access_token,
            &current_user.user.email,
            filter.status,
            &pagination,
        )
        .await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/v1/dashboard/stats
pub async fn stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<DashboardStats>>, AppError> {
    let stats = state
        .store
        .stats(&current_user.access_token, &current_user.user.email)
        .await?;
    Ok(ApiResponse::success(stats))
}

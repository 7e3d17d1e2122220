//! Past-audit listing and statistics for the dashboard.
//!
//! Audits live in the `audits` table of the Supabase project and are read
//! through PostgREST with the caller's own token, so row-level security
//! decides what each user can see.

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::audit::AuditStatus;
use crate::models::finding::{Finding, GasAnalysis, RawFinding, Severity};
use crate::models::pagination::{total_from_content_range, PagedResult, Pagination};
use crate::services::report::StorageLocation;
use crate::services::{score, storage};

/// Upper bound on rows read when aggregating statistics.
const STATS_ROW_LIMIT: u32 = 1000;

/// Row of the `audits` table.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub status: AuditStatus,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "auditJson")]
    pub audit_json: Option<Vec<RawFinding>>,
    #[serde(default, alias = "gasOptimizations")]
    pub gas_optimizations: Option<GasAnalysis>,
    #[serde(default, alias = "pdfUrl")]
    pub pdf_url: Option<String>,
}

/// One dashboard row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub id: String,
    pub name: String,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub issues_found: usize,
    pub worst_severity: Option<Severity>,
    /// Only present once the audit has completed.
    pub security_score: Option<u8>,
    pub gas_optimizations: usize,
    pub download_url: Option<String>,
}

impl AuditSummary {
    pub fn from_record(record: AuditRecord, storage_location: &StorageLocation) -> Self {
        let findings: Vec<Finding> = record
            .audit_json
            .unwrap_or_default()
            .into_iter()
            .map(Finding::from)
            .collect();
        let completed = record.status == AuditStatus::Completed;

        let name = match record.wallet.as_deref().filter(|w| !w.is_empty()) {
            Some(wallet) => wallet.to_string(),
            None => format!("Audit-{}", record.id.chars().take(8).collect::<String>()),
        };

        Self {
            name,
            status: record.status,
            created_at: record.created_at,
            completed_at: record.completed_at,
            issues_found: findings.len(),
            worst_severity: score::worst_severity(&findings),
            security_score: completed.then(|| score::score_findings(&findings)),
            gas_optimizations: record
                .gas_optimizations
                .map(|g| g.suggestions.len())
                .unwrap_or_default(),
            download_url: record.pdf_url.as_deref().and_then(|pdf| {
                storage::public_url(&storage_location.base_url, &storage_location.bucket, pdf)
            }),
            id: record.id,
        }
    }
}

/// Status filter accepted by the list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl StatusFilter {
    fn status(&self) -> Option<AuditStatus> {
        match self {
            Self::All => None,
            Self::Pending => Some(AuditStatus::Pending),
            Self::Completed => Some(AuditStatus::Completed),
            Self::Error => Some(AuditStatus::Error),
        }
    }
}

/// Aggregate figures for the dashboard header.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    /// Audits whose worst finding is critical.
    pub critical: usize,
    /// Mean score over scored audits, rounded; `None` when nothing is scored.
    pub average_score: Option<u8>,
}

pub fn compute_stats(audits: &[AuditSummary]) -> DashboardStats {
    let count = |status: AuditStatus| audits.iter().filter(|a| a.status == status).count();
    let scores: Vec<u32> = audits
        .iter()
        .filter_map(|a| a.security_score.map(u32::from))
        .collect();

    let average_score = (!scores.is_empty()).then(|| {
        let mean = scores.iter().sum::<u32>() as f64 / scores.len() as f64;
        mean.round() as u8
    });

    DashboardStats {
        total: audits.len(),
        completed: count(AuditStatus::Completed),
        pending: count(AuditStatus::Pending),
        failed: count(AuditStatus::Error),
        critical: audits
            .iter()
            .filter(|a| a.worst_severity == Some(Severity::Critical))
            .count(),
        average_score,
    }
}

/// Read access to the `audits` table.
#[derive(Clone)]
pub struct AuditStore {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    storage: StorageLocation,
}

impl AuditStore {
    pub fn new(http: reqwest::Client, supabase_url: &str, api_key: &str, storage: StorageLocation) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1/audits", supabase_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            storage,
        }
    }

    /// One page of the user's audits, newest first.
    pub async fn list(
        &self,
        access_token: &str,
        email: &str,
        filter: StatusFilter,
        pagination: &Pagination,
    ) -> Result<PagedResult<AuditSummary>, AppError> {
        let (records, total) = self
            .fetch(access_token, email, filter, pagination.limit(), pagination.offset())
            .await?;
        let items: Vec<AuditSummary> = records
            .into_iter()
            .map(|r| AuditSummary::from_record(r, &self.storage))
            .collect();
        let total = total.unwrap_or(items.len() as u64);
        Ok(PagedResult::new(items, total, pagination))
    }

    pub async fn stats(&self, access_token: &str, email: &str) -> Result<DashboardStats, AppError> {
        let (records, _) = self
            .fetch(access_token, email, StatusFilter::All, STATS_ROW_LIMIT, 0)
            .await?;
        let audits: Vec<AuditSummary> = records
            .into_iter()
            .map(|r| AuditSummary::from_record(r, &self.storage))
            .collect();
        Ok(compute_stats(&audits))
    }

    async fn fetch(
        &self,
        access_token: &str,
        email: &str,
        filter: StatusFilter,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<AuditRecord>, Option<u64>), AppError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("email", format!("eq.{email}")),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(status) = filter.status() {
            params.push(("status", format!("eq.{status}")));
        }
        let url = Url::parse_with_params(&self.rest_url, &params)
            .map_err(|e| AppError::Configuration(format!("Invalid SUPABASE_URL: {e}")))?;

        let response = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .header("Prefer", "count=exact")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);
        let records: Vec<AuditRecord> = response
            .json()
            .await
            .map_err(|e| AppError::Schema(format!("Invalid audits response: {e}")))?;

        Ok((records, total))
    }
}

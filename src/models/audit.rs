//! Audit job models: lifecycle status, submission DTOs, report wire format and view model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::finding::{Finding, GasAnalysis, RawFinding, Severity};

// -- Status --

/// Lifecycle status of an audit job as reported by the audit backend.
///
/// Some backend revisions report `"failed"` instead of `"error"`; both map to
/// [`AuditStatus::Error`]. Any other value is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl AuditStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether an observed status change is allowed.
///
/// Status only moves forward: `Pending` may stay or become terminal, and a
/// terminal status never changes.
pub fn is_valid_transition(from: AuditStatus, to: AuditStatus) -> bool {
    matches!(
        (from, to),
        (AuditStatus::Pending, _)
            | (AuditStatus::Completed, AuditStatus::Completed)
            | (AuditStatus::Error, AuditStatus::Error)
    )
}

// -- Submission --

/// Audit request as entered by the user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuditSubmission {
    #[serde(default)]
    pub wallet: String,
    #[validate(custom(function = "not_blank", message = "Source code is required"))]
    pub code: String,
    #[validate(email(message = "Email address is invalid"))]
    #[serde(default)]
    pub email: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

impl AuditSubmission {
    /// Copy with the email trimmed; a blank email becomes `None`.
    pub fn normalized(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            code: self.code.clone(),
            email: self
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }

    /// Run field validation on the normalized submission, flattening the
    /// messages into one user-facing string.
    pub fn check(&self) -> Result<(), String> {
        self.normalized().validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            messages.sort();
            messages.join("; ")
        })
    }
}

/// Response to `POST {API}/audit`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub audit_id: Option<String>,
}

/// Response to `POST {API}/status/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: AuditStatus,
}

/// Full report as returned by `POST {API}/report/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub status: AuditStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audit_json: Option<Vec<RawFinding>>,
    #[serde(default)]
    pub gas_optimizations: Option<GasAnalysis>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

// -- View model --

/// Per-severity finding counts for the summary cards.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeverityBreakdown {
    pub total_issues: usize,
    pub critical_issues: usize,
    pub high_issues: usize,
    pub medium_issues: usize,
    pub low_issues: usize,
    pub gas_optimizations: usize,
}

/// Qualitative label shown next to the security score.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ScoreRating {
    Excellent,
    Good,
    NeedsImprovement,
}

impl fmt::Display for ScoreRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::NeedsImprovement => write!(f, "Needs Improvement"),
        }
    }
}

/// Completed audit, mapped and scored for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub id: String,
    pub wallet: Option<String>,
    pub email: Option<String>,
    pub status: AuditStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub findings: Vec<Finding>,
    pub gas: GasAnalysis,
    pub summary: SeverityBreakdown,
    pub security_score: u8,
    pub rating: ScoreRating,
    pub download_url: Option<String>,
}

impl AuditReport {
    /// Title used in the report header: the wallet if known, otherwise a short id.
    pub fn display_name(&self) -> String {
        match self.wallet.as_deref().filter(|w| !w.is_empty()) {
            Some(wallet) => wallet.to_string(),
            None => format!("Audit-{}", self.id.chars().take(8).collect::<String>()),
        }
    }

    /// Findings of the given severity, in report order.
    pub fn findings_with(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }
}

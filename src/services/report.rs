//! Mapping of raw audit-backend reports into the scored view model.

use crate::models::audit::{AuditReport, AuditStatus, RawReport};
use crate::models::finding::Finding;
use crate::services::{score, storage};

/// Where generated artifacts are published.
#[derive(Debug, Clone)]
pub struct StorageLocation {
    pub base_url: String,
    pub bucket: String,
}

/// Map a completed raw report. Returns `None` while the report is not yet
/// `completed`.
pub fn map_report(
    audit_id: &str,
    raw: RawReport,
    storage_location: &StorageLocation,
) -> Option<AuditReport> {
    if raw.status != AuditStatus::Completed {
        return None;
    }

    let findings: Vec<Finding> = raw
        .audit_json
        .unwrap_or_default()
        .into_iter()
        .map(Finding::from)
        .collect();
    let gas = raw.gas_optimizations.unwrap_or_default();

    let security_score = score::score_findings(&findings);
    let summary = score::breakdown(&findings, gas.suggestions.len());

    let download_url = raw.pdf_url.as_deref().and_then(|pdf| {
        storage::public_url(&storage_location.base_url, &storage_location.bucket, pdf)
    });

    Some(AuditReport {
        id: raw.id.unwrap_or_else(|| audit_id.to_string()),
        wallet: raw.wallet,
        email: raw.email,
        status: raw.status,
        created_at: raw.created_at,
        completed_at: raw.completed_at,
        findings,
        gas,
        summary,
        security_score,
        rating: score::rating(security_score),
        download_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::ScoreRating;
    use crate::models::finding::Severity;
    use serde_json::json;

    fn location() -> StorageLocation {
        StorageLocation {
            base_url: "https://proj.supabase.co".to_string(),
            bucket: "audit-reports".to_string(),
        }
    }

    fn completed_raw() -> RawReport {
        serde_json::from_value(json!({
            "status": "completed",
            "email": "dev@example.com",
            "wallet": "0x742d35Cc6482C06F25c85Dd7a630B95b9e123456",
            "auditJson": [
                {"line": 45, "issue": "Reentrancy", "severity": "critical",
                 "recommendation": "Use checks-effects-interactions", "category": "Security"},
                {"line": 78, "issue": "Integer overflow", "severity": "High",
                 "recommendation": "Upgrade to Solidity 0.8"},
                {"line": 92, "issue": "Missing access control", "severity": "medium",
                 "recommendation": "Use Ownable", "category": "Access Control"},
                {"line": 123, "issue": "Loop gas", "severity": "low",
                 "recommendation": "Cache length", "category": "Gas Optimization"}
            ],
            "gasOptimizations": {
                "suggestions": [
                    {"line": 10, "description": "Pack structs", "estimatedSavings": 2000},
                    {"line": 20, "description": "Use events", "estimatedSavings": 800}
                ],
                "estimatedGas": 2450000
            },
            "pdfUrl": "reports/audit-1.pdf"
        }))
        .unwrap()
    }

    #[test]
    fn pending_report_is_not_ready() {
        let raw: RawReport = serde_json::from_value(json!({"status": "pending"})).unwrap();
        assert!(map_report("a1", raw, &location()).is_none());
    }

    #[test]
    fn error_report_is_not_mapped() {
        let raw: RawReport = serde_json::from_value(json!({"status": "error"})).unwrap();
        assert!(map_report("a1", raw, &location()).is_none());
    }

    #[test]
    fn completed_report_is_scored_and_categorized() {
        let report = map_report("audit-1", completed_raw(), &location()).unwrap();

        assert_eq!(report.id, "audit-1");
        assert_eq!(report.findings.len(), 4);
        assert_eq!(report.security_score, 35);
        assert_eq!(report.rating, ScoreRating::NeedsImprovement);
        assert_eq!(report.summary.critical_issues, 1);
        assert_eq!(report.summary.gas_optimizations, 2);
        assert_eq!(report.findings[1].category, "Security");
        assert_eq!(report.findings_with(Severity::High).count(), 1);
        assert_eq!(
            report.download_url.as_deref(),
            Some("https://proj.supabase.co/storage/v1/object/public/audit-reports/reports/audit-1.pdf")
        );
    }

    #[test]
    fn completed_report_without_findings_scores_full() {
        let raw: RawReport =
            serde_json::from_value(json!({"status": "completed", "auditJson": null})).unwrap();
        let report = map_report("abcdef123456", raw, &location()).unwrap();
        assert_eq!(report.security_score, 100);
        assert_eq!(report.rating, ScoreRating::Excellent);
        assert!(report.download_url.is_none());
        assert_eq!(report.display_name(), "Audit-abcdef12");
    }
}

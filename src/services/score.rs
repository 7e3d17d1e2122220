//! Security score derived from audit findings.
//!
//! The score starts at 100 and loses a fixed weight per finding:
//! critical 30, high 20, medium 10, low 5. It never drops below 0 and is
//! recomputed on every read rather than stored.

use crate::models::audit::{ScoreRating, SeverityBreakdown};
use crate::models::finding::{Finding, Severity};

const MAX_SCORE: u32 = 100;

/// Compute the 0-100 security score for a set of finding severities.
pub fn security_score<I>(severities: I) -> u8
where
    I: IntoIterator<Item = Severity>,
{
    let penalty: u32 = severities.into_iter().map(|s| s.weight()).sum();
    MAX_SCORE.saturating_sub(penalty) as u8
}

/// Convenience wrapper over [`security_score`] for mapped findings.
pub fn score_findings(findings: &[Finding]) -> u8 {
    security_score(findings.iter().map(|f| f.severity))
}

/// Label shown next to the score.
pub fn rating(score: u8) -> ScoreRating {
    match score {
        80.. => ScoreRating::Excellent,
        60..=79 => ScoreRating::Good,
        _ => ScoreRating::NeedsImprovement,
    }
}

/// Count findings per severity.
pub fn breakdown(findings: &[Finding], gas_optimizations: usize) -> SeverityBreakdown {
    let mut summary = SeverityBreakdown {
        total_issues: findings.len(),
        gas_optimizations,
        ..Default::default()
    };
    for finding in findings {
        match finding.severity {
            Severity::Critical => summary.critical_issues += 1,
            Severity::High => summary.high_issues += 1,
            Severity::Medium => summary.medium_issues += 1,
            Severity::Low => summary.low_issues += 1,
        }
    }
    summary
}

/// Worst severity present, if any.
pub fn worst_severity(findings: &[Finding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}

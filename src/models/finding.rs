//! Finding and gas-suggestion models shared by reports and the dashboard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// -- Severity --

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points deducted from the security score for one finding of this severity.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 30,
            Self::High => 20,
            Self::Medium => 10,
            Self::Low => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

// The backend is inconsistent about case ("High" vs "high").
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// -- Wire shapes returned by the audit API --

/// Vulnerability entry as produced by the audit backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFinding {
    #[serde(default)]
    pub line: u32,
    pub issue: String,
    pub severity: Severity,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSuggestion {
    #[serde(default)]
    pub line: u32,
    pub description: String,
    #[serde(default)]
    pub estimated_savings: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasAnalysis {
    #[serde(default)]
    pub suggestions: Vec<GasSuggestion>,
    #[serde(default)]
    pub estimated_gas: u64,
}

impl GasAnalysis {
    /// Sum of the per-suggestion savings estimates.
    pub fn total_savings(&self) -> u64 {
        self.suggestions.iter().map(|s| s.estimated_savings).sum()
    }
}

// -- View model --

/// Category assigned when the backend does not classify a finding.
pub const DEFAULT_CATEGORY: &str = "Security";

/// A finding as presented to users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub line: u32,
    pub title: String,
    pub recommendation: String,
    pub category: String,
}

impl From<RawFinding> for Finding {
    fn from(raw: RawFinding) -> Self {
        Self {
            severity: raw.severity,
            line: raw.line,
            title: raw.issue,
            recommendation: raw.recommendation,
            category: raw
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        }
    }
}

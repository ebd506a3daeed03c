//! Predictive validation request and verdict types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Issue found by the deterministic validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    /// "error", "warning" or "info"
    pub level: String,
}

/// Behavioural inference drawn by the deterministic validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationInference {
    pub category: String,
    pub observation: String,
    pub level: String,
}

/// Reporter and device metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub reporter_history_count: u32,
    pub rejected_reports_count: u32,
    pub device_fingerprint_match: bool,
    pub average_evidence_distance: f64,
    pub report_frequency_score: i64,
    /// ISO-8601 join date, when known.
    #[serde(default)]
    pub reporter_join_date: Option<String>,
}

impl ValidationMetadata {
    /// Rejected reports as a percentage of the reporter's history.
    pub fn rejection_rate(&self) -> f64 {
        if self.reporter_history_count == 0 {
            return 0.0;
        }
        f64::from(self.rejected_reports_count) / f64::from(self.reporter_history_count) * 100.0
    }

    /// A reporter with no history at all.
    pub fn is_new_reporter(&self) -> bool {
        self.reporter_history_count == 0 && self.rejected_reports_count == 0
    }
}

/// Precomputed signals supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicSignals {
    pub trust_score: i64,
    /// Verdict of the deterministic pass. Never shown to the oracle.
    pub is_valid: bool,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub inferences: Vec<ValidationInference>,
    pub metadata: ValidationMetadata,
    #[serde(default)]
    pub issues_count: u32,
    #[serde(default)]
    pub inferences_count: u32,
}

impl DeterministicSignals {
    pub fn error_issue_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.level.eq_ignore_ascii_case("error"))
            .count()
    }
}

/// Inbound predictive validation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub report_id: i64,
    pub report_title: String,
    pub report_summary: String,
    /// Category slugs already attached to the report.
    #[serde(default)]
    pub categories: Vec<String>,
    pub deterministic_validation: DeterministicSignals,
}

impl ValidationRequest {
    pub fn assessment(&self) -> AssessmentRequest {
        AssessmentRequest {
            title: self.report_title.clone(),
            summary: self.report_summary.clone(),
            categories: self.categories.clone(),
            signals: self.deterministic_validation.clone(),
        }
    }
}

/// What the oracle is asked to assess.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub title: String,
    pub summary: String,
    pub categories: Vec<String>,
    pub signals: DeterministicSignals,
}

/// Final validity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityStatus {
    Valid,
    Suspicious,
    Invalid,
    RequiresReview,
}

impl ValidityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Suspicious => "suspicious",
            Self::Invalid => "invalid",
            Self::RequiresReview => "requires_review",
        }
    }
}

impl fmt::Display for ValidityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured verdict produced by the oracle (or the fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub summary: String,
    pub requires_human_review: bool,
    /// 0..=100
    pub confidence_score: f64,
    pub final_validity_status: ValidityStatus,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub supporting_inferences: Vec<String>,
}

impl ValidationVerdict {
    /// Safe verdict published when the oracle could not produce one.
    pub fn fallback(failure: impl fmt::Display) -> Self {
        Self {
            summary: format!("Validation error occurred: {}", failure),
            requires_human_review: true,
            confidence_score: 0.0,
            final_validity_status: ValidityStatus::RequiresReview,
            reasons: vec![format!("An error occurred during validation: {}", failure)],
            supporting_inferences: Vec::new(),
        }
    }

    /// Clamp the confidence score into 0..=100.
    pub fn normalized(mut self) -> Self {
        self.confidence_score = if self.confidence_score.is_finite() {
            self.confidence_score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }
}

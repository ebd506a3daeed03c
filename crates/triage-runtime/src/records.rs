//! Records published to the result streams.
//!
//! Every record carries `time_added` (RFC 3339, UTC) and `is_final`. The
//! correlation id is omitted when the run has none.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use triage_core::{RunContext, ValidationVerdict};

/// Progress or final record of a categorisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationRecord {
    pub report_id: String,
    pub recognized_categories: Vec<String>,
    pub time_added: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
}

impl CategorizationRecord {
    pub fn new(report_id: &str, slugs: Vec<String>, is_final: bool, ctx: &RunContext) -> Self {
        Self {
            report_id: report_id.to_string(),
            recognized_categories: slugs,
            time_added: timestamp(),
            is_final,
            correlation_id: ctx.correlation_id.clone(),
            evidence_id: ctx.evidence_id.clone(),
        }
    }
}

/// Terminal record of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub report_id: i64,
    #[serde(flatten)]
    pub verdict: ValidationVerdict,
    pub time_added: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ValidationRecord {
    pub fn final_for(report_id: i64, verdict: ValidationVerdict, ctx: &RunContext) -> Self {
        Self {
            report_id,
            verdict,
            time_added: timestamp(),
            is_final: true,
            correlation_id: ctx.correlation_id.clone(),
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

//! Per-run identity threaded through every engine call.

use serde::{Deserialize, Serialize};

/// Identity of one classification or validation run.
///
/// Carries the correlation id explicitly; nothing about a run is kept in
/// global state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub evidence_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl RunContext {
    pub fn for_report(report_id: impl Into<String>) -> Self {
        Self {
            report_id: Some(report_id.into()),
            ..Self::default()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_evidence_id(mut self, evidence_id: impl Into<String>) -> Self {
        self.evidence_id = Some(evidence_id.into());
        self
    }

    /// Span that every log line of the run is recorded under.
    pub fn span(&self, workflow: &'static str) -> tracing::Span {
        tracing::info_span!(
            "workflow",
            workflow = workflow,
            report_id = self.report_id.as_deref().unwrap_or(""),
            evidence_id = self.evidence_id.as_deref().unwrap_or(""),
            correlation_id = self.correlation_id.as_deref().unwrap_or(""),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_correlation_id_is_dropped() {
        let ctx = RunContext::for_report("r-1").with_correlation_id(Some("  ".to_string()));
        assert_eq!(ctx.correlation_id, None);

        let ctx = RunContext::for_report("r-1").with_correlation_id(Some("c-9".to_string()));
        assert_eq!(ctx.correlation_id.as_deref(), Some("c-9"));
    }
}

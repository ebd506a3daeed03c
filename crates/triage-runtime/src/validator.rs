//! Single-pass predictive validation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use triage_core::{ClassificationOracle, RunContext, StreamRecordId, ValidationRequest, ValidationVerdict};

use crate::error::WorkflowError;
use crate::records::ValidationRecord;
use crate::sink::StreamSink;

/// Result of one validation run.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdict: ValidationVerdict,
    /// The oracle failed and the safe fallback verdict was used.
    pub fell_back: bool,
    pub final_record: Option<StreamRecordId>,
}

/// Asks the oracle for one verdict and publishes it as the final record.
pub struct Validator {
    oracle: Arc<dyn ClassificationOracle>,
    sink: Option<StreamSink>,
}

impl Validator {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { oracle, sink: None }
    }

    pub fn with_sink(mut self, sink: StreamSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn validate(
        &self,
        request: &ValidationRequest,
        ctx: &RunContext,
    ) -> Result<ValidationOutcome, WorkflowError> {
        let signals = &request.deterministic_validation;
        info!(
            report_id = request.report_id,
            trust_score = signals.trust_score,
            issues = signals.issues.len(),
            inferences = signals.inferences.len(),
            "starting predictive validation"
        );

        let (verdict, fell_back) = match self.oracle.assess(&request.assessment()).await {
            Ok(verdict) => (verdict.normalized(), false),
            Err(err) => {
                warn!(report_id = request.report_id, error = %err, "oracle failed; using fallback verdict");
                (ValidationVerdict::fallback(&err), true)
            }
        };
        info!(
            report_id = request.report_id,
            status = %verdict.final_validity_status,
            confidence = verdict.confidence_score,
            requires_human_review = verdict.requires_human_review,
            fell_back,
            "validation finished"
        );

        let final_record = match &self.sink {
            Some(sink) => {
                let record = ValidationRecord::final_for(request.report_id, verdict.clone(), ctx);
                let id = sink.publish(&record).await.map_err(|err| {
                    warn!(stream = sink.name(), error = %err, "validation record not published");
                    err
                })?;
                debug!(stream = sink.name(), record_id = %id, "validation record published");
                Some(id)
            }
            None => None,
        };

        Ok(ValidationOutcome {
            verdict,
            fell_back,
            final_record,
        })
    }
}

//! LLM-backed classification oracle.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use triage_core::{
    AssessmentRequest, CategoryId, CategoryNode, ClassificationDecision, ClassificationOracle,
    OracleError, ValidationVerdict, ValidityStatus,
};

use crate::llm::{extract_json, truncate_for_log, LlmClient, LlmRequest};
use crate::prompts::{categorization_prompt, validation_prompt};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;
const MAX_LLM_OUTPUT_LOG_CHARS: usize = 8_000;

/// Model settings for oracle calls.
#[derive(Debug, Clone)]
pub struct LlmOracleConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmOracleConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

/// Oracle that asks an LLM and parses its JSON reply.
pub struct LlmOracle<C: LlmClient> {
    pub client: C,
    pub config: LlmOracleConfig,
}

#[derive(Debug, Deserialize)]
struct CategoryReply {
    #[serde(default)]
    category_ids: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct VerdictReply {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    requires_human_review: Option<bool>,
    #[serde(default)]
    confidence_score: Option<f64>,
    final_validity_status: String,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    supporting_inferences: Vec<String>,
}

impl<C: LlmClient> LlmOracle<C> {
    pub fn new(client: C, config: LlmOracleConfig) -> Self {
        Self { client, config }
    }

    async fn ask(&self, kind: &'static str, system: String, user: String) -> Result<String, OracleError> {
        info!(
            model = %self.config.model,
            temperature = self.config.temperature,
            kind,
            "oracle request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                system_prompt = %truncate_for_log(&system, MAX_PROMPT_LOG_CHARS),
                user_prompt = %truncate_for_log(&user, MAX_PROMPT_LOG_CHARS),
                "oracle prompts"
            );
        }

        let output = self
            .client
            .complete(LlmRequest {
                system,
                user,
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            })
            .await
            .map_err(|e| OracleError::Backend(e.to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                llm_output = %truncate_for_log(&output, MAX_LLM_OUTPUT_LOG_CHARS),
                "oracle raw llm output"
            );
        }

        extract_json(&output).ok_or_else(|| {
            OracleError::MalformedOutput("LLM output did not contain JSON".to_string())
        })
    }
}

/// Accepts `3` as well as `"3"`; anything else is malformed.
fn parse_category_id(value: &Value) -> Result<CategoryId, OracleError> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| OracleError::MalformedOutput(format!("invalid category id {}", value)))
}

fn parse_status(raw: &str) -> Result<ValidityStatus, OracleError> {
    let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "valid" => Ok(ValidityStatus::Valid),
        "suspicious" => Ok(ValidityStatus::Suspicious),
        "invalid" => Ok(ValidityStatus::Invalid),
        "requires_review" => Ok(ValidityStatus::RequiresReview),
        _ => Err(OracleError::MalformedOutput(format!(
            "unknown validity status '{}'",
            raw
        ))),
    }
}

#[async_trait]
impl<C: LlmClient> ClassificationOracle for LlmOracle<C> {
    async fn classify(
        &self,
        title: &str,
        description: &str,
        candidates: &[&CategoryNode],
    ) -> Result<ClassificationDecision, OracleError> {
        if candidates.is_empty() {
            return Ok(ClassificationDecision::none());
        }
        let (system, user) = categorization_prompt(title, description, candidates);
        let json = self.ask("classify", system, user).await?;

        let reply: CategoryReply = serde_json::from_str(&json)
            .map_err(|e| OracleError::MalformedOutput(format!("invalid categories JSON: {}", e)))?;
        let ids = reply
            .category_ids
            .iter()
            .map(parse_category_id)
            .collect::<Result<Vec<_>, _>>()?;
        info!(matched = ids.len(), candidates = candidates.len(), "oracle classified");
        Ok(ClassificationDecision::new(ids))
    }

    async fn assess(&self, request: &AssessmentRequest) -> Result<ValidationVerdict, OracleError> {
        let (system, user) = validation_prompt(request);
        let json = self.ask("assess", system, user).await?;

        let reply: VerdictReply = serde_json::from_str(&json)
            .map_err(|e| OracleError::MalformedOutput(format!("invalid verdict JSON: {}", e)))?;
        let status = parse_status(&reply.final_validity_status)?;
        let verdict = ValidationVerdict {
            summary: reply.summary,
            requires_human_review: reply
                .requires_human_review
                .unwrap_or(status != ValidityStatus::Valid),
            confidence_score: reply.confidence_score.unwrap_or(0.0),
            final_validity_status: status,
            reasons: reply.reasons,
            supporting_inferences: reply.supporting_inferences,
        }
        .normalized();
        info!(
            status = %verdict.final_validity_status,
            confidence = verdict.confidence_score,
            "oracle assessed"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use triage_core::{CategoryTree, DeterministicSignals, ValidationMetadata};

    fn tree() -> CategoryTree {
        CategoryTree::from_json(
            r#"[{"id":1,"name":"Crime","slug":"crime","description":""},
                {"id":2,"name":"Fire","slug":"fire","description":""}]"#,
        )
        .unwrap()
    }

    fn assessment() -> AssessmentRequest {
        AssessmentRequest {
            title: "t".to_string(),
            summary: "s".to_string(),
            categories: Vec::new(),
            signals: DeterministicSignals {
                trust_score: 50,
                is_valid: true,
                issues: Vec::new(),
                inferences: Vec::new(),
                metadata: ValidationMetadata {
                    reporter_history_count: 0,
                    rejected_reports_count: 0,
                    device_fingerprint_match: true,
                    average_evidence_distance: 0.0,
                    report_frequency_score: 0,
                    reporter_join_date: None,
                },
                issues_count: 0,
                inferences_count: 0,
            },
        }
    }

    fn oracle(reply: &str) -> LlmOracle<MockLlmClient> {
        LlmOracle::new(MockLlmClient::new(reply), LlmOracleConfig::default())
    }

    #[test]
    fn test_classify_parses_ids_from_noisy_reply() {
        tokio_test::block_on(async {
            let tree = tree();
            let oracle = oracle("Here you go: {\"category_ids\": [2, \"1\"]}");
            let decision = oracle
                .classify("House on fire", "", &tree.roots())
                .await
                .unwrap();
            assert_eq!(decision, ClassificationDecision::new([1, 2]));

            let requests = oracle.client.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].model, "gpt-4o-mini");
            assert!(requests[0].user.contains("House on fire"));
        });
    }

    #[test]
    fn test_classify_without_candidates_skips_llm() {
        tokio_test::block_on(async {
            let oracle = oracle("{\"category_ids\": [1]}");
            let decision = oracle.classify("x", "y", &[]).await.unwrap();
            assert!(decision.is_empty());
            assert!(oracle.client.requests().is_empty());
        });
    }

    #[test]
    fn test_classify_rejects_garbage() {
        tokio_test::block_on(async {
            let tree = tree();
            let no_json = oracle("I cannot decide").classify("a", "b", &tree.roots()).await;
            assert!(matches!(no_json, Err(OracleError::MalformedOutput(_))));

            let bad_id = oracle("{\"category_ids\": [true]}")
                .classify("a", "b", &tree.roots())
                .await;
            assert!(matches!(bad_id, Err(OracleError::MalformedOutput(_))));
        });
    }

    #[test]
    fn test_backend_failure_is_backend_error() {
        tokio_test::block_on(async {
            let tree = tree();
            let oracle = LlmOracle::new(
                MockLlmClient::scripted(vec![Err("connection refused".to_string())]),
                LlmOracleConfig::default(),
            );
            let result = oracle.classify("a", "b", &tree.roots()).await;
            assert!(matches!(result, Err(OracleError::Backend(msg)) if msg.contains("refused")));
        });
    }

    #[test]
    fn test_assess_parses_and_clamps_verdict() {
        tokio_test::block_on(async {
            let oracle = oracle(
                r#"{"summary":"Looks fabricated","confidence_score":130,
                    "final_validity_status":"Requires Review",
                    "reasons":["no evidence"],"supporting_inferences":["burst of reports"]}"#,
            );
            let verdict = oracle.assess(&assessment()).await.unwrap();
            assert_eq!(verdict.final_validity_status, ValidityStatus::RequiresReview);
            assert_eq!(verdict.confidence_score, 100.0);
            assert!(verdict.requires_human_review);
            assert_eq!(verdict.reasons, vec!["no evidence".to_string()]);
        });
    }

    #[test]
    fn test_assess_unknown_status_is_malformed() {
        tokio_test::block_on(async {
            let oracle = oracle(r#"{"final_validity_status":"probably"}"#);
            let result = oracle.assess(&assessment()).await;
            assert!(matches!(result, Err(OracleError::MalformedOutput(_))));
        });
    }
}

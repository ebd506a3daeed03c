//! Rule-based oracle used when no LLM is configured.

use std::collections::HashSet;

use async_trait::async_trait;

use triage_core::{
    AssessmentRequest, CategoryNode, ClassificationDecision, ClassificationOracle, OracleError,
    ValidationVerdict, ValidityStatus,
};

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "being", "from", "have", "into", "more", "other", "over",
    "such", "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "under", "when", "where", "which", "while", "with", "within", "without",
];

/// Deterministic oracle matching category text against report text.
///
/// A candidate matches when its name occurs in the report, when any word of
/// its slug does, or when any description keyword of at least
/// `min_keyword_len` characters does.
#[derive(Debug, Clone)]
pub struct KeywordOracle {
    min_keyword_len: usize,
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self { min_keyword_len: 4 }
    }
}

impl KeywordOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_keyword_len(mut self, len: usize) -> Self {
        self.min_keyword_len = len.max(1);
        self
    }

    fn matches(&self, node: &CategoryNode, text: &str, words: &HashSet<String>) -> bool {
        let name = node.name.trim().to_lowercase();
        if !name.is_empty() && text.contains(&name) {
            return true;
        }
        if node
            .slug
            .split(['-', '_'])
            .filter(|w| w.len() >= 3)
            .any(|w| words.contains(&w.to_lowercase()))
        {
            return true;
        }
        tokenize(&node.description)
            .into_iter()
            .filter(|w| w.chars().count() >= self.min_keyword_len)
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .any(|w| words.contains(&w))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl ClassificationOracle for KeywordOracle {
    async fn classify(
        &self,
        title: &str,
        description: &str,
        candidates: &[&CategoryNode],
    ) -> Result<ClassificationDecision, OracleError> {
        let text = format!("{} {}", title, description).to_lowercase();
        let words: HashSet<String> = tokenize(&text).into_iter().collect();
        Ok(ClassificationDecision::new(
            candidates
                .iter()
                .filter(|node| self.matches(node, &text, &words))
                .map(|node| node.id),
        ))
    }

    async fn assess(&self, request: &AssessmentRequest) -> Result<ValidationVerdict, OracleError> {
        let signals = &request.signals;
        let metadata = &signals.metadata;
        let trust = signals.trust_score.clamp(0, 100);
        let rejection_rate = metadata.rejection_rate();
        let errors = signals.error_issue_count();

        let mut reasons = Vec::new();
        if metadata.is_new_reporter() {
            reasons.push("New reporter without history; absence of history is not held against the report".to_string());
        } else {
            reasons.push(format!(
                "Reporter has {} previous reports with a {:.1}% rejection rate",
                metadata.reporter_history_count, rejection_rate
            ));
        }
        reasons.push(format!("Trust score is {}/100", trust));
        if errors > 0 {
            reasons.push(format!("{} error-level issue(s) were detected", errors));
        }
        if !metadata.device_fingerprint_match {
            reasons.push("Device fingerprint does not match the reporter's known devices".to_string());
        }

        let established = metadata.reporter_history_count >= 3;
        let status = if trust < 25 || (established && rejection_rate >= 60.0) {
            ValidityStatus::Invalid
        } else if errors > 0 || rejection_rate >= 25.0 || trust < 50 {
            ValidityStatus::Suspicious
        } else if !metadata.device_fingerprint_match {
            ValidityStatus::RequiresReview
        } else {
            ValidityStatus::Valid
        };

        let confidence = match status {
            ValidityStatus::Valid => trust as f64,
            ValidityStatus::Invalid => (100 - trust) as f64,
            ValidityStatus::Suspicious | ValidityStatus::RequiresReview => 50.0,
        };

        Ok(ValidationVerdict {
            summary: format!(
                "Rule-based assessment: {} (trust score {}, rejection rate {:.1}%)",
                status, trust, rejection_rate
            ),
            requires_human_review: status != ValidityStatus::Valid,
            confidence_score: confidence,
            final_validity_status: status,
            reasons,
            supporting_inferences: signals
                .inferences
                .iter()
                .map(|i| i.observation.clone())
                .collect(),
        }
        .normalized())
    }
}

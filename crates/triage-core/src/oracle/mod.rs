//! Classification oracle module
//!
//! The oracle is responsible for:
//! - Judging which candidate categories match a report
//! - Producing a predictive validity verdict
//!
//! The oracle does NOT handle:
//! - Walking the category tree
//! - Publishing results
//! - Recovering from its own failures (callers decide the fallback)

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AssessmentRequest, CategoryId, CategoryNode, ValidationVerdict};

/// Oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle backend error: {0}")]
    Backend(String),

    #[error("Malformed oracle output: {0}")]
    MalformedOutput(String),

    #[error("Oracle is unavailable: {0}")]
    Unavailable(String),
}

/// One level of descent: ids the oracle asserts to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationDecision {
    pub matched: BTreeSet<CategoryId>,
}

impl ClassificationDecision {
    pub fn new(matched: impl IntoIterator<Item = CategoryId>) -> Self {
        Self {
            matched: matched.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.matched.contains(&id)
    }

    /// Keep only ids present in `candidates`, returning the ids that were dropped.
    pub fn retain_candidates(&mut self, candidates: &[&CategoryNode]) -> Vec<CategoryId> {
        let allowed: BTreeSet<CategoryId> = candidates.iter().map(|c| c.id).collect();
        let dropped: Vec<CategoryId> = self.matched.difference(&allowed).copied().collect();
        self.matched.retain(|id| allowed.contains(id));
        dropped
    }
}

/// ClassificationOracle trait - semantic judgments for the workflows
///
/// Implementations can be LLM-backed or rule-based and are interchangeable.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Select the candidates matching the report text.
    async fn classify(
        &self,
        title: &str,
        description: &str,
        candidates: &[&CategoryNode],
    ) -> Result<ClassificationDecision, OracleError>;

    /// Produce a structured validity verdict.
    async fn assess(&self, request: &AssessmentRequest) -> Result<ValidationVerdict, OracleError>;
}

#[async_trait]
impl ClassificationOracle for Arc<dyn ClassificationOracle> {
    async fn classify(
        &self,
        title: &str,
        description: &str,
        candidates: &[&CategoryNode],
    ) -> Result<ClassificationDecision, OracleError> {
        (**self).classify(title, description, candidates).await
    }

    async fn assess(&self, request: &AssessmentRequest) -> Result<ValidationVerdict, OracleError> {
        (**self).assess(request).await
    }
}

//! Test doubles shared by the workflow tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use triage_core::{
    AssessmentRequest, CategoryId, CategoryNode, ClassificationDecision, ClassificationOracle,
    DurableStream, EncodedFields, FieldValue, OracleError, PendingEntry, StartPosition,
    StoreError, StreamRecord, StreamRecordId, ValidationVerdict,
};
use triage_stores::InMemoryDurableStream;

pub(crate) const TREE_JSON: &str = r#"[
  {"id":1,"name":"A","slug":"a","description":"","children":[
    {"id":11,"name":"A1","slug":"a1","description":"","parent_id":1},
    {"id":12,"name":"A2","slug":"a2","description":"","parent_id":1}
  ]},
  {"id":2,"name":"B","slug":"b","description":""}
]"#;

/// Oracle answering from a table keyed by the candidate ids it is shown.
#[derive(Default)]
pub(crate) struct ScriptedOracle {
    answers: HashMap<Vec<CategoryId>, Result<Vec<CategoryId>, String>>,
    verdict: Option<Result<ValidationVerdict, String>>,
    calls: Mutex<Vec<Vec<CategoryId>>>,
}

impl ScriptedOracle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn answer(mut self, candidates: &[CategoryId], matched: &[CategoryId]) -> Self {
        self.answers
            .insert(candidates.to_vec(), Ok(matched.to_vec()));
        self
    }

    pub(crate) fn fail(mut self, candidates: &[CategoryId], message: &str) -> Self {
        self.answers
            .insert(candidates.to_vec(), Err(message.to_string()));
        self
    }

    pub(crate) fn verdict(mut self, verdict: Result<ValidationVerdict, String>) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<CategoryId>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ClassificationOracle for ScriptedOracle {
    async fn classify(
        &self,
        _title: &str,
        _description: &str,
        candidates: &[&CategoryNode],
    ) -> Result<ClassificationDecision, OracleError> {
        let ids: Vec<CategoryId> = candidates.iter().map(|c| c.id).collect();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ids.clone());
        }
        match self.answers.get(&ids) {
            Some(Ok(matched)) => Ok(ClassificationDecision::new(matched.iter().copied())),
            Some(Err(message)) => Err(OracleError::Backend(message.clone())),
            None => Ok(ClassificationDecision::none()),
        }
    }

    async fn assess(&self, _request: &AssessmentRequest) -> Result<ValidationVerdict, OracleError> {
        match &self.verdict {
            Some(Ok(verdict)) => Ok(verdict.clone()),
            Some(Err(message)) => Err(OracleError::Unavailable(message.clone())),
            None => Err(OracleError::Unavailable("no verdict scripted".to_string())),
        }
    }
}

/// In-memory stream that can be told to reject progress or final appends.
#[derive(Default)]
pub(crate) struct FlakyStream {
    pub(crate) inner: InMemoryDurableStream,
    pub(crate) fail_progress: bool,
    pub(crate) fail_final: bool,
}

impl FlakyStream {
    pub(crate) fn failing_progress() -> Arc<Self> {
        Arc::new(Self {
            fail_progress: true,
            ..Self::default()
        })
    }

    pub(crate) fn failing_final() -> Arc<Self> {
        Arc::new(Self {
            fail_final: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl DurableStream for FlakyStream {
    async fn append(
        &self,
        stream: &str,
        fields: EncodedFields,
        max_len: Option<usize>,
    ) -> Result<StreamRecordId, StoreError> {
        let is_final = fields.get("is_final") == Some(&FieldValue::from(true));
        if (is_final && self.fail_final) || (!is_final && self.fail_progress) {
            return Err(StoreError::Connection("stream offline".to_string()));
        }
        self.inner.append(stream, fields, max_len).await
    }

    async fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError> {
        self.inner.create_consumer_group(stream, group, start).await
    }

    async fn read_as_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        self.inner
            .read_as_consumer(stream, group, consumer, count, block)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamRecordId) -> Result<bool, StoreError> {
        self.inner.ack(stream, group, id).await
    }

    async fn reclaim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        self.inner
            .reclaim_pending(stream, group, consumer, min_idle, count)
            .await
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StoreError> {
        self.inner.pending(stream, group, count).await
    }

    async fn range(
        &self,
        stream: &str,
        count: Option<usize>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        self.inner.range(stream, count).await
    }

    async fn len(&self, stream: &str) -> Result<usize, StoreError> {
        self.inner.len(stream).await
    }
}

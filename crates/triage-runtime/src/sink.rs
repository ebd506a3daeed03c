//! Stream destination shared by the workflows.

use std::sync::Arc;

use serde::Serialize;

use triage_core::codec::encode_serializable;
use triage_core::{DurableStream, StreamRecordId};

use crate::error::WorkflowError;

/// A named stream plus the trim bound applied on every append.
#[derive(Clone)]
pub struct StreamSink {
    stream: Arc<dyn DurableStream>,
    name: String,
    max_len: Option<usize>,
}

impl StreamSink {
    pub fn new(stream: Arc<dyn DurableStream>, name: impl Into<String>) -> Self {
        Self {
            stream,
            name: name.into(),
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flatten `record` through the payload codec and append it.
    pub async fn publish<T: Serialize + Sync>(
        &self,
        record: &T,
    ) -> Result<StreamRecordId, WorkflowError> {
        let fields = encode_serializable(record)?;
        Ok(self.stream.append(&self.name, fields, self.max_len).await?)
    }
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("name", &self.name)
            .field("max_len", &self.max_len)
            .finish()
    }
}

use thiserror::Error;

use triage_core::{CodecError, StoreError, TreeError};

/// Failures that end a workflow run.
///
/// Oracle failures never appear here: they are recovered inside the run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("category tree retrieval failed: {0}")]
    Retrieval(#[from] TreeError),
    #[error("stream error: {0}")]
    Stream(#[from] StoreError),
    #[error("record encoding failed: {0}")]
    Codec(#[from] CodecError),
}

impl WorkflowError {
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::Retrieval(_))
    }
}

//! Store module
//!
//! Storage abstractions consumed by the workflows:
//! - DurableStream: append-only log with consumer groups
//! - CategorySource: read-only access to the cached category tree
//!
//! Note: Implementations are in the triage-stores crate

mod category_source;
mod stream;

pub use category_source::CategorySource;
pub use stream::{DurableStream, PendingEntry, StartPosition, StreamRecord, StreamRecordId};

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Consumer group '{group}' does not exist on stream '{stream}'")]
    NoGroup { stream: String, group: String },

    #[error("Invalid record id: {0}")]
    InvalidId(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

//! # Triage Stores
//!
//! Store implementations for the triage workflows.
//!
//! This crate provides:
//! - InMemory and Redis DurableStream
//! - InMemory and Redis CategorySource

mod category_source;
mod durable_stream;

pub use category_source::{InMemoryCategorySource, RedisCategorySource};
pub use durable_stream::{InMemoryDurableStream, RedisDurableStream};

// Re-export core traits for convenience
pub use triage_core::store::{
    CategorySource, DurableStream, PendingEntry, StartPosition, StoreError, StreamRecord,
    StreamRecordId,
};

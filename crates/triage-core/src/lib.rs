//! # Triage Core
//!
//! Shared model for the report triage workflows:
//! - `types`: category tree, validation request/verdict, run context
//! - `store`: durable stream and category source traits (implementations live
//!   in `triage-stores`)
//! - `oracle`: the classification oracle capability
//! - `codec`: scalar-only payload encoding for stream records

pub mod codec;
pub mod oracle;
pub mod store;
pub mod types;

pub use codec::{CodecError, EncodedFields, FieldValue};
pub use oracle::{ClassificationDecision, ClassificationOracle, OracleError};
pub use store::{
    CategorySource, DurableStream, PendingEntry, StartPosition, StoreError, StreamRecord,
    StreamRecordId,
};
pub use types::{
    AssessmentRequest, CategoryId, CategoryNode, CategoryTree, DeterministicSignals, RunContext,
    TreeError, ValidationInference, ValidationIssue, ValidationMetadata, ValidationRequest,
    ValidationVerdict, ValidityStatus,
};

//! Core domain types

mod category;
mod run;
mod validation;

pub use category::{CategoryId, CategoryNode, CategoryTree, TreeError};
pub use run::RunContext;
pub use validation::{
    AssessmentRequest, DeterministicSignals, ValidationInference, ValidationIssue,
    ValidationMetadata, ValidationRequest, ValidationVerdict, ValidityStatus,
};

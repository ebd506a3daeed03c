//! # Triage Runtime
//!
//! The two workflows of the triage service and the wiring around them:
//! - [`Categorizer`]: recursive tree descent over the category taxonomy
//! - [`Validator`]: one-shot predictive validation
//! - [`WorkflowSupervisor`]: background runs with failure logging
//! - [`TriageRuntime`]: everything built from one `triage.yaml`

mod bootstrap;
mod categorizer;
pub mod consumer;
mod error;
mod records;
mod sink;
mod supervisor;
mod validator;

#[cfg(test)]
mod testing;

pub use bootstrap::{
    init_tracing_if_needed, BootstrapError, CategorizationRequest, TriageRuntime,
};
pub use categorizer::{CategorizationOutcome, Categorizer};
pub use consumer::{tail, TailOptions};
pub use error::WorkflowError;
pub use records::{CategorizationRecord, ValidationRecord};
pub use sink::StreamSink;
pub use supervisor::{RunStatus, WorkflowHandle, WorkflowKind, WorkflowSupervisor, WorkflowTicket};
pub use validator::{ValidationOutcome, Validator};

//! Fire-and-forget workflow spawning.
//!
//! Scheduled runs have no result channel back to the caller; the final
//! stream record is the outcome. The supervisor only makes sure failures and
//! panics end up in the logs.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use triage_core::RunContext;

use crate::error::WorkflowError;

/// Kind of workflow a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Categorization,
    Validation,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categorization => "categorization",
            Self::Validation => "validation",
        }
    }
}

/// Identity handed back to the caller that scheduled a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTicket {
    pub run_id: String,
    pub kind: WorkflowKind,
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed(String),
    Panicked(String),
}

/// A scheduled run. Dropping it detaches the task.
#[derive(Debug)]
pub struct WorkflowHandle {
    pub ticket: WorkflowTicket,
    join: JoinHandle<RunStatus>,
}

impl WorkflowHandle {
    /// Wait for the run to end.
    pub async fn wait(self) -> RunStatus {
        match self.join.await {
            Ok(status) => status,
            Err(err) => RunStatus::Panicked(err.to_string()),
        }
    }
}

/// Spawns workflow runs and counts the ones still in flight.
///
/// There is no admission limit: every scheduled run gets its own task.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSupervisor {
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkflowSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn `future` on the tokio runtime inside the run's span.
    pub fn spawn<F, T>(&self, kind: WorkflowKind, ctx: &RunContext, future: F) -> WorkflowHandle
    where
        F: Future<Output = Result<T, WorkflowError>> + Send + 'static,
        T: Send + 'static,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(self.in_flight.clone());
        let span = ctx.span(kind.as_str());

        let task_run_id = run_id.clone();
        let join = tokio::spawn(
            async move {
                let _guard = guard;
                let started = std::time::Instant::now();
                info!(run_id = %task_run_id, "workflow started");
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(_)) => {
                        info!(
                            run_id = %task_run_id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "workflow completed"
                        );
                        RunStatus::Completed
                    }
                    Ok(Err(err)) => {
                        error!(run_id = %task_run_id, error = %err, "workflow failed");
                        RunStatus::Failed(err.to_string())
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(run_id = %task_run_id, panic = %message, "workflow panicked");
                        RunStatus::Panicked(message)
                    }
                }
            }
            .instrument(span),
        );

        WorkflowHandle {
            ticket: WorkflowTicket { run_id, kind },
            join,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_core::{StoreError, TreeError};

    #[tokio::test]
    async fn test_completed_run_releases_slot() {
        let supervisor = WorkflowSupervisor::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = supervisor.spawn(
            WorkflowKind::Categorization,
            &RunContext::for_report("r-1"),
            async move {
                let _ = rx.await;
                Ok::<_, WorkflowError>(())
            },
        );

        assert_eq!(supervisor.in_flight(), 1);
        assert_eq!(handle.ticket.kind, WorkflowKind::Categorization);
        assert!(!handle.ticket.run_id.is_empty());

        let _ = tx.send(());
        assert_eq!(handle.wait().await, RunStatus::Completed);
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_run_is_reported() {
        let supervisor = WorkflowSupervisor::new();
        let handle = supervisor.spawn(
            WorkflowKind::Categorization,
            &RunContext::default(),
            async { Err::<(), _>(WorkflowError::Retrieval(TreeError::NotFound("k".into()))) },
        );
        match handle.wait().await {
            RunStatus::Failed(message) => assert!(message.contains("no category tree")),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let supervisor = WorkflowSupervisor::new();
        let handle = supervisor.spawn(WorkflowKind::Validation, &RunContext::default(), async {
            if true {
                panic!("oracle exploded");
            }
            Ok::<(), WorkflowError>(())
        });
        assert_eq!(
            handle.wait().await,
            RunStatus::Panicked("oracle exploded".to_string())
        );
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_runs_do_not_wait_for_each_other() {
        let supervisor = WorkflowSupervisor::new();
        let slow = supervisor.spawn(WorkflowKind::Validation, &RunContext::default(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), WorkflowError>(())
        });
        let fast = supervisor.spawn(WorkflowKind::Validation, &RunContext::default(), async {
            Err::<(), _>(WorkflowError::Stream(StoreError::Connection("down".into())))
        });

        assert!(matches!(fast.wait().await, RunStatus::Failed(_)));
        assert_eq!(supervisor.in_flight(), 1);
        assert_ne!(slow.ticket.run_id, "");
    }
}

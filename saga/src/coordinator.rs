use log::*;
use std::fmt;

use crate::error::{rollback_failed, step_failed, Error, SagaErrorKind};
use crate::step::{Responses, Step};

/// Lifecycle of a workflow.
///
/// `Pending -> Running -> {Committed, RollingBack -> RolledBack | RollbackFailed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Pending,
    Running,
    Committed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkflowState::Pending => write!(f, "pending"),
            WorkflowState::Running => write!(f, "running"),
            WorkflowState::Committed => write!(f, "committed"),
            WorkflowState::RollingBack => write!(f, "rolling_back"),
            WorkflowState::RolledBack => write!(f, "rolled_back"),
            WorkflowState::RollbackFailed => write!(f, "rollback_failed"),
        }
    }
}

/// An ordered list of steps executed as one logical unit. Created per
/// request, executed once, then discarded; nothing is persisted.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    steps: Vec<Step>,
    state: WorkflowState,
    responses: Responses,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            state: WorkflowState::Pending,
            responses: Responses::default(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Responses of the steps that committed, including those later rolled back.
    pub fn responses(&self) -> &Responses {
        &self.responses
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn transition(&mut self, next: WorkflowState) {
        debug!("Workflow '{}': {} -> {}", self.name, self.state, next);
        self.state = next;
    }
}

/// Executes workflows strictly sequentially, rolling back committed steps in
/// reverse commit order when a forward action fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coordinator;

impl Coordinator {
    pub fn new() -> Self {
        Self
    }

    /// Run every step of `workflow` in order.
    ///
    /// On success the workflow is `Committed` and the captured responses are
    /// returned. On the first forward failure every committed step is
    /// compensated, newest first, continuing past compensation failures.
    /// The caller then gets `StepFailed` (state `RolledBack`) or, if any
    /// compensation failed, `RollbackFailed` (state `RollbackFailed`); both
    /// carry the original forward error as their source.
    pub async fn execute(&self, workflow: &mut Workflow) -> Result<Responses, Error> {
        if workflow.state != WorkflowState::Pending {
            return Err(Error {
                source: None,
                error_kind: SagaErrorKind::AlreadyExecuted,
            });
        }

        workflow.transition(WorkflowState::Running);
        info!(
            "Executing workflow '{}' ({} steps)",
            workflow.name,
            workflow.steps.len()
        );

        for index in 0..workflow.steps.len() {
            let step = &workflow.steps[index];
            let name = step.name().to_string();
            let outcome = step.run_forward(workflow.responses.clone()).await;

            match outcome {
                Ok(response) => {
                    debug!("Workflow '{}': step '{}' committed", workflow.name, name);
                    workflow.responses.push(&name, response);
                }
                Err(e) => {
                    warn!(
                        "Workflow '{}': step '{}' failed: {}. Rolling back {} committed step(s)",
                        workflow.name, name, e, index
                    );
                    workflow.transition(WorkflowState::RollingBack);

                    let failed_compensations = self.rollback(workflow, index).await;

                    if failed_compensations.is_empty() {
                        workflow.transition(WorkflowState::RolledBack);
                        info!("Workflow '{}' rolled back", workflow.name);
                        return Err(step_failed(&name, e));
                    }

                    workflow.transition(WorkflowState::RollbackFailed);
                    error!(
                        "Workflow '{}' rollback failed for {:?}; manual reconciliation required",
                        workflow.name, failed_compensations
                    );
                    return Err(rollback_failed(&name, failed_compensations, e));
                }
            }
        }

        workflow.transition(WorkflowState::Committed);
        info!("Workflow '{}' committed", workflow.name);
        Ok(workflow.responses.clone())
    }

    /// Compensate steps `0..committed` newest first. Returns the names of
    /// steps whose compensation failed.
    async fn rollback(&self, workflow: &Workflow, committed: usize) -> Vec<String> {
        let mut failed = Vec::new();

        for step in workflow.steps[..committed].iter().rev() {
            match step.run_compensation(workflow.responses.clone()).await {
                None => info!(
                    "Workflow '{}': step '{}' has no compensation, skipping",
                    workflow.name,
                    step.name()
                ),
                Some(Ok(())) => debug!(
                    "Workflow '{}': step '{}' compensated",
                    workflow.name,
                    step.name()
                ),
                Some(Err(e)) => {
                    error!(
                        "Workflow '{}': compensation of step '{}' failed: {}",
                        workflow.name,
                        step.name(),
                        e
                    );
                    failed.push(step.name().to_string());
                }
            }
        }

        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    #[tokio::test]
    async fn empty_workflow_commits() {
        let mut workflow = Workflow::new("empty");
        let responses = Coordinator::new().execute(&mut workflow).await.unwrap();
        assert!(responses.is_empty());
        assert_eq!(workflow.state(), WorkflowState::Committed);
    }

    #[tokio::test]
    async fn workflow_cannot_run_twice() {
        let mut workflow =
            Workflow::new("once").step(Step::new("a", |_| async { Ok::<_, BoxError>(()) }));
        let coordinator = Coordinator::new();
        coordinator.execute(&mut workflow).await.unwrap();

        let err = coordinator.execute(&mut workflow).await.unwrap_err();
        assert_eq!(err.error_kind, SagaErrorKind::AlreadyExecuted);
        assert_eq!(workflow.state(), WorkflowState::Committed);
    }
}

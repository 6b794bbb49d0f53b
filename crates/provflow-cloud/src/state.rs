//! Execution state for a single run
//!
//! `ExecutionState` records are owned by the orchestrator and mutated only
//! through the transition methods below.

use crate::error::{CloudError, Result};
use crate::provider::ExternalId;
use crate::rollback::RollbackReport;
use chrono::{DateTime, Utc};
use provflow_core::{DeleteAction, ProvisioningPlan, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};

/// Status of a resource within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Not started
    Pending,
    /// Lookup/create issued, waiting for readiness
    Creating,
    /// Usable
    Ready,
    /// Create or readiness failed
    Failed,
    /// Compensating delete succeeded
    RolledBack,
    /// Compensating delete failed; needs manual cleanup
    Leaked,
}

impl ExecutionStatus {
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Creating)
                | (Creating, Ready)
                | (Creating, Failed)
                | (Creating | Ready | Failed, RolledBack)
                | (Creating | Ready | Failed, Leaked)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Creating => write!(f, "creating"),
            ExecutionStatus::Ready => write!(f, "ready"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::RolledBack => write!(f, "rolled-back"),
            ExecutionStatus::Leaked => write!(f, "leaked"),
        }
    }
}

/// Per-resource record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub id: String,
    pub kind: ResourceKind,
    pub status: ExecutionStatus,
    pub external_id: Option<ExternalId>,
    /// Provider round-trips spent on lookup/create (retries included)
    pub attempts: u32,
    /// Found through lookup rather than created by this run
    pub adopted: bool,
    pub delete_action: DeleteAction,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExecutionState {
    pub fn pending(spec: &ResourceSpec) -> Self {
        Self {
            id: spec.id.clone(),
            kind: spec.kind.clone(),
            status: ExecutionStatus::Pending,
            external_id: None,
            attempts: 0,
            adopted: false,
            delete_action: spec.delete_action,
            started_at: None,
            ready_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CloudError::InvalidTransition {
                resource: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending -> Creating
    pub fn begin(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(ExecutionStatus::Creating)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Record the id obtained by lookup or create (status stays Creating)
    pub fn attach(&mut self, external_id: ExternalId, adopted: bool, attempts: u32) {
        self.external_id = Some(external_id);
        self.adopted = adopted;
        self.attempts = attempts;
    }

    /// Creating -> Ready
    pub fn mark_ready(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(ExecutionStatus::Ready)?;
        self.ready_at = Some(at);
        Ok(())
    }

    /// Creating -> Failed
    pub fn mark_failed(&mut self, error: &CloudError) -> Result<()> {
        self.transition(ExecutionStatus::Failed)?;
        self.error = Some(error.to_string());
        Ok(())
    }

    pub fn mark_rolled_back(&mut self) -> Result<()> {
        self.transition(ExecutionStatus::RolledBack)
    }

    pub fn mark_leaked(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Leaked)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Whether rollback has to act on this resource.
    ///
    /// The resource was Creating or Ready when the run halted and the provider
    /// handed out an id for it. A resource whose create call itself failed never
    /// got an id and needs no compensation.
    pub fn needs_compensation(&self) -> bool {
        self.external_id.is_some()
            && matches!(
                self.status,
                ExecutionStatus::Creating | ExecutionStatus::Ready | ExecutionStatus::Failed
            )
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    FailedWithLeaks,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    /// CLI exit code (1 is reserved for pre-flight failures)
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded => 0,
            RunOutcome::Failed => 2,
            RunOutcome::FailedWithLeaks => 3,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::FailedWithLeaks => write!(f, "failed-with-leaks"),
        }
    }
}

/// All execution states of one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub plan: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// In plan (dependency) order
    pub states: Vec<ExecutionState>,
    pub outcome: Option<RunOutcome>,
    pub halt_reason: Option<String>,
    pub rollback: Option<RollbackReport>,
}

impl Run {
    pub fn new(plan: &ProvisioningPlan) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("{}-{}", plan.name(), started_at.format("%Y%m%dT%H%M%S%3fZ")),
            plan: plan.name().to_string(),
            started_at,
            finished_at: None,
            states: plan.resources().iter().map(ExecutionState::pending).collect(),
            outcome: None,
            halt_reason: None,
            rollback: None,
        }
    }

    pub fn state(&self, id: &str) -> Option<&ExecutionState> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state_mut(&mut self, id: &str) -> Option<&mut ExecutionState> {
        self.states.iter_mut().find(|s| s.id == id)
    }

    pub fn all_ready(&self) -> bool {
        self.states
            .iter()
            .all(|s| s.status == ExecutionStatus::Ready)
    }

    /// Resources to compensate, dependents before their dependencies
    pub fn compensation_order(&self) -> impl Iterator<Item = &ExecutionState> {
        self.states.iter().rev().filter(|s| s.needs_compensation())
    }

    pub fn ids_with_status(&self, status: ExecutionStatus) -> Vec<&str> {
        self.states
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ExecutionState {
        ExecutionState::pending(&ResourceSpec::new("network", "network"))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = state();
        s.begin(Utc::now()).unwrap();
        s.attach("vpc-1".into(), false, 1);
        s.mark_ready(Utc::now()).unwrap();
        assert_eq!(s.status, ExecutionStatus::Ready);
        assert!(s.ready_at.is_some());
        assert!(s.needs_compensation());
    }

    #[test]
    fn test_pending_cannot_become_ready() {
        let mut s = state();
        let err = s.mark_ready(Utc::now()).unwrap_err();
        assert!(matches!(err, CloudError::InvalidTransition { .. }));
        assert_eq!(s.status, ExecutionStatus::Pending);
    }

    #[test]
    fn test_pending_never_needs_compensation() {
        let s = state();
        assert!(!s.needs_compensation());
        assert!(!ExecutionStatus::Pending.can_transition_to(ExecutionStatus::RolledBack));
    }

    #[test]
    fn test_failed_without_id_needs_no_compensation() {
        let mut s = state();
        s.begin(Utc::now()).unwrap();
        s.mark_failed(&CloudError::Cancelled("x".into())).unwrap();
        assert!(!s.needs_compensation());

        s.attach("vpc-2".into(), false, 1);
        assert!(s.needs_compensation());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Succeeded.exit_code(), 0);
        assert_eq!(RunOutcome::Failed.exit_code(), 2);
        assert_eq!(RunOutcome::FailedWithLeaks.exit_code(), 3);
    }

    #[test]
    fn test_compensation_order_is_reverse_plan_order() {
        let plan = ProvisioningPlan::build(
            "t",
            vec![
                ResourceSpec::new("a", "network"),
                ResourceSpec::new("b", "subnet").with_dependency("a"),
                ResourceSpec::new("c", "database").with_dependency("b"),
            ],
        )
        .unwrap();
        let mut run = Run::new(&plan);
        for s in run.states.iter_mut() {
            s.begin(Utc::now()).unwrap();
            s.attach(format!("ext-{}", s.id).into(), false, 1);
        }
        let order: Vec<_> = run.compensation_order().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }
}

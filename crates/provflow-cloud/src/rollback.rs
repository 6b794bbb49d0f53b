//! Rollback: compensating deletes in reverse dependency order

use crate::error::{CloudError, ProviderError};
use crate::events::{EventSink, RunEvent};
use crate::provider::{ExternalId, Provider};
use crate::state::Run;
use provflow_core::{DeleteAction, ResourceKind, RetryPolicy};
use serde::{Deserialize, Serialize};

/// What rollback did for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompensationOutcome {
    /// Deleted (or already gone)
    RolledBack,
    /// Delete failed; the resource still exists. `error` is the rendered
    /// `CloudError::Rollback`.
    Leaked { error: String },
    /// Left in place on purpose
    Retained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub id: String,
    pub kind: ResourceKind,
    pub external_id: ExternalId,
    #[serde(flatten)]
    pub outcome: CompensationOutcome,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackReport {
    /// In the order the deletes were issued
    pub entries: Vec<RollbackEntry>,
}

impl RollbackReport {
    pub fn has_leaks(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.outcome, CompensationOutcome::Leaked { .. }))
    }

    pub fn order(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}

struct Target {
    id: String,
    kind: ResourceKind,
    external_id: ExternalId,
    adopted: bool,
    delete_action: DeleteAction,
}

/// Deletes what a halted run left behind
///
/// Deletes are issued one at a time: a resource is only removed after every
/// resource depending on it has been handled. Rollback itself is never
/// cancelled.
pub struct RollbackManager<'a> {
    provider: &'a dyn Provider,
    retry: &'a RetryPolicy,
    events: &'a EventSink,
}

impl<'a> RollbackManager<'a> {
    pub fn new(provider: &'a dyn Provider, retry: &'a RetryPolicy, events: &'a EventSink) -> Self {
        Self {
            provider,
            retry,
            events,
        }
    }

    /// Compensate every resource of the run that needs it and record the result
    /// on its execution state.
    pub async fn rollback(&self, run: &mut Run) -> RollbackReport {
        let targets: Vec<Target> = run
            .compensation_order()
            .filter_map(|state| {
                state.external_id.clone().map(|external_id| Target {
                    id: state.id.clone(),
                    kind: state.kind.clone(),
                    external_id,
                    adopted: state.adopted,
                    delete_action: state.delete_action,
                })
            })
            .collect();

        self.events.emit(RunEvent::RollbackStarted {
            count: targets.len(),
        });

        let mut report = RollbackReport::default();
        for target in targets {
            let entry = self.compensate(target).await;
            if let Some(state) = run.state_mut(&entry.id) {
                let applied = match &entry.outcome {
                    CompensationOutcome::RolledBack => state.mark_rolled_back(),
                    CompensationOutcome::Leaked { error } => state.mark_leaked(error.clone()),
                    CompensationOutcome::Retained => Ok(()),
                };
                if let Err(e) = applied {
                    tracing::warn!(resource = %entry.id, error = %e, "Could not record rollback result");
                }
            }
            report.entries.push(entry);
        }
        report
    }

    async fn compensate(&self, target: Target) -> RollbackEntry {
        if !target.delete_action.should_delete(target.adopted) {
            tracing::info!(
                resource = %target.id,
                external_id = %target.external_id,
                adopted = target.adopted,
                "Retaining resource"
            );
            self.events.emit(RunEvent::Retained {
                id: target.id.clone(),
                external_id: target.external_id.clone(),
            });
            return RollbackEntry {
                id: target.id,
                kind: target.kind,
                external_id: target.external_id,
                outcome: CompensationOutcome::Retained,
                attempts: 0,
            };
        }

        let (outcome, attempts) = self.delete_with_retry(&target).await;
        match &outcome {
            CompensationOutcome::RolledBack => self.events.emit(RunEvent::RolledBack {
                id: target.id.clone(),
                external_id: target.external_id.clone(),
            }),
            CompensationOutcome::Leaked { error } => self.events.emit(RunEvent::Leaked {
                id: target.id.clone(),
                external_id: target.external_id.clone(),
                error: error.clone(),
            }),
            CompensationOutcome::Retained => {}
        }

        RollbackEntry {
            id: target.id,
            kind: target.kind,
            external_id: target.external_id,
            outcome,
            attempts,
        }
    }

    async fn delete_with_retry(&self, target: &Target) -> (CompensationOutcome, u32) {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let attempts = attempt + 1;
            match self.provider.delete(&target.kind, &target.external_id).await {
                Ok(()) => return (CompensationOutcome::RolledBack, attempts),
                Err(ProviderError::NotFound(_)) => {
                    tracing::debug!(resource = %target.id, "Already gone");
                    return (CompensationOutcome::RolledBack, attempts);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(resource = %target.id, attempt = attempts, error = %e, "Delete failed, retrying");
                    last_error = Some(e);
                }
                Err(e) => return (leaked(target, &e), attempts),
            }

            if attempts < max_attempts {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            }
        }

        let error = last_error.unwrap_or_else(|| ProviderError::transient("no attempt was made"));
        (leaked(target, &error), max_attempts)
    }
}

fn leaked(target: &Target, error: &ProviderError) -> CompensationOutcome {
    let error = CloudError::Rollback {
        resource: target.id.clone(),
        message: error.to_string(),
    };
    tracing::error!(resource = %target.id, external_id = %target.external_id, error = %error, "Leaked resource");
    CompensationOutcome::Leaked {
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryProvider, Operation};
    use crate::state::ExecutionStatus;
    use chrono::Utc;
    use provflow_core::{ProvisioningPlan, ResourceSpec};

    fn plan() -> ProvisioningPlan {
        ProvisioningPlan::build(
            "rollback-test",
            vec![
                ResourceSpec::new("network", "network"),
                ResourceSpec::new("subnet", "subnet").with_dependency("network"),
                ResourceSpec::new("rule", "security_rule").with_dependency("subnet"),
            ],
        )
        .unwrap()
    }

    async fn created_run(provider: &MemoryProvider, plan: &ProvisioningPlan) -> Run {
        let mut run = Run::new(plan);
        for spec in plan.resources() {
            let external_id = provider
                .create(&spec.kind, &serde_json::Map::new())
                .await
                .unwrap();
            let state = run.state_mut(&spec.id).unwrap();
            state.begin(Utc::now()).unwrap();
            state.attach(external_id, false, 1);
            state.mark_ready(Utc::now()).unwrap();
        }
        run
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 10,
            multiplier: 1.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_in_reverse_order() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        assert_eq!(report.order(), vec!["rule", "subnet", "network"]);
        assert!(!report.has_leaks());
        assert_eq!(provider.live_resources(), 0);
        assert_eq!(
            run.ids_with_status(ExecutionStatus::RolledBack),
            vec!["network", "subnet", "rule"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_counts_as_rolled_back() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        provider.fail_delete(
            ResourceKind::Subnet,
            ProviderError::NotFound("already deleted".into()),
        );
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        assert!(!report.has_leaks());
        assert_eq!(
            run.state("subnet").unwrap().status,
            ExecutionStatus::RolledBack
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_leaks_and_continues() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        provider.fail_delete(ResourceKind::SecurityRule, ProviderError::permanent("in use"));
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        assert!(report.has_leaks());
        assert_eq!(
            report.entries[0].outcome,
            CompensationOutcome::Leaked {
                error: "Failed to delete 'rule' during rollback: Permanent provider error: in use"
                    .into()
            }
        );
        assert_eq!(run.state("rule").unwrap().status, ExecutionStatus::Leaked);
        assert_eq!(
            run.state("network").unwrap().status,
            ExecutionStatus::RolledBack
        );
        assert_eq!(provider.count(Operation::Delete, &ResourceKind::SecurityRule), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_delete_is_retried() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        provider.fail_delete_times(ResourceKind::Network, 2, ProviderError::transient("busy"));
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        assert!(!report.has_leaks());
        let network = report.entries.iter().find(|e| e.id == "network").unwrap();
        assert_eq!(network.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adopted_resources_are_retained_by_default() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        run.state_mut("network").unwrap().adopted = true;
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        let network = report.entries.iter().find(|e| e.id == "network").unwrap();
        assert_eq!(network.outcome, CompensationOutcome::Retained);
        assert_eq!(run.state("network").unwrap().status, ExecutionStatus::Ready);
        assert_eq!(provider.count(Operation::Delete, &ResourceKind::Network), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_resources_are_untouched() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = Run::new(&plan);
        let external_id = provider
            .create(&ResourceKind::Network, &serde_json::Map::new())
            .await
            .unwrap();
        let network = run.state_mut("network").unwrap();
        network.begin(Utc::now()).unwrap();
        network.attach(external_id, false, 1);
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        assert_eq!(report.order(), vec!["network"]);
        assert_eq!(run.state("subnet").unwrap().status, ExecutionStatus::Pending);
        assert_eq!(run.state("rule").unwrap().status, ExecutionStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_delete_retries_leak() {
        let provider = MemoryProvider::new();
        let plan = plan();
        let mut run = created_run(&provider, &plan).await;
        provider.fail_delete_times(ResourceKind::Network, 5, ProviderError::transient("busy"));
        let retry = retry();
        let events = EventSink::silent();

        let report = RollbackManager::new(&provider, &retry, &events)
            .rollback(&mut run)
            .await;

        let network = report.entries.iter().find(|e| e.id == "network").unwrap();
        assert_eq!(network.attempts, 3);
        assert_eq!(
            network.outcome,
            CompensationOutcome::Leaked {
                error: "Failed to delete 'network' during rollback: Transient provider error: busy"
                    .into()
            }
        );
    }
}

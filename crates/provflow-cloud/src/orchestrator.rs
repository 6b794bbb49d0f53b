//! Provisioning orchestrator
//!
//! Drives a plan to completion: launches every resource whose dependencies are
//! ready (bounded by `max_parallel`), halts on the first failure, cancellation,
//! or deadline, and rolls back whatever the run left behind.
//!
//! The orchestrator is the only writer of execution state. Workers run lookup,
//! create, and readiness polling, and hand their result back as a `StepReport`.

use crate::error::CloudError;
use crate::events::{EventSink, RunEvent};
use crate::executor::{StepExecutor, StepOutcome};
use crate::poller::{Readiness, ReadinessPoller, sleep_until};
use crate::provider::Provider;
use crate::rollback::RollbackManager;
use crate::state::{ExecutionStatus, Run, RunOutcome};
use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use provflow_core::{PlanSettings, ProvisioningPlan, ResourceSpec, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_parallel: usize,
    pub poll_interval: Duration,
    pub run_deadline: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&PlanSettings::default())
    }
}

impl From<&PlanSettings> for OrchestratorConfig {
    fn from(settings: &PlanSettings) -> Self {
        Self {
            max_parallel: settings.max_parallel.max(1),
            poll_interval: settings.poll_interval(),
            run_deadline: settings.run_deadline(),
            retry: settings.retry.clone(),
        }
    }
}

/// What a worker hands back for one resource
struct StepReport {
    index: usize,
    step: StepOutcome,
    /// `None` when the step never produced an external id
    readiness: Option<Readiness>,
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    config: OrchestratorConfig,
    events: EventSink,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            config,
            events: EventSink::silent(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Execute the plan.
    ///
    /// Cancelling `cancel` stops new steps and in-flight polling; creates already
    /// issued are allowed to complete so their result can be rolled back.
    pub async fn run(&self, plan: &ProvisioningPlan, cancel: CancellationToken) -> Run {
        let mut run = Run::new(plan);
        tracing::info!(
            run_id = %run.run_id,
            resources = plan.len(),
            max_parallel = self.config.max_parallel,
            "Starting run"
        );

        let halt = self.drive(plan, &mut run, &cancel).await;
        self.finalize(&mut run, halt).await;
        run
    }

    /// Launch and settle steps until everything is ready or the run halts.
    /// Returns the halt reason, if any.
    async fn drive(
        &self,
        plan: &ProvisioningPlan,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Option<String> {
        // Cancelling the child stops workers without touching the caller's token
        let workers = cancel.child_token();
        // A deadline too large to represent is treated as no deadline
        let deadline = self
            .config
            .run_deadline
            .and_then(|d| Instant::now().checked_add(d).map(|at| (at, d)));
        let mut in_flight = FuturesUnordered::new();
        let mut halt: Option<String> = None;

        loop {
            if halt.is_none() {
                if cancel.is_cancelled() {
                    halt = Some(CloudError::Cancelled("interrupted".into()).to_string());
                } else if let Some((_, limit)) = deadline.filter(|(at, _)| Instant::now() >= *at) {
                    halt = Some(CloudError::DeadlineExceeded(limit).to_string());
                }
                if halt.is_some() {
                    workers.cancel();
                }
            }

            if halt.is_none() {
                for index in self.launchable(plan, run, in_flight.len()) {
                    let spec = &plan.resources()[index];
                    if let Err(e) = run.states[index].begin(Utc::now()) {
                        tracing::warn!(resource = %spec.id, error = %e, "Could not start step");
                        continue;
                    }
                    self.events.emit(RunEvent::StepStarted {
                        id: spec.id.clone(),
                        kind: spec.kind.clone(),
                    });
                    in_flight.push(self.work(index, spec, workers.clone()));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                Some(report) = in_flight.next() => {
                    let spec = &plan.resources()[report.index];
                    let failure = self.settle(run, spec, report);
                    if let Some(error) = failure.filter(|_| halt.is_none()) {
                        self.events.emit(RunEvent::Halted { reason: error.clone() });
                        halt = Some(error);
                        workers.cancel();
                    }
                }
                _ = cancel.cancelled(), if halt.is_none() => {
                    // picked up at the top of the loop
                }
                _ = sleep_until(deadline.map(|(at, _)| at)), if halt.is_none() => {}
            }
        }

        halt
    }

    /// Pending resources whose dependencies are all ready, in plan order,
    /// limited to the free worker slots
    fn launchable(&self, plan: &ProvisioningPlan, run: &Run, running: usize) -> Vec<usize> {
        let free = self.config.max_parallel.max(1).saturating_sub(running);
        plan.resources()
            .iter()
            .enumerate()
            .filter(|(index, _)| run.states[*index].status == ExecutionStatus::Pending)
            .filter(|(_, spec)| {
                spec.depends_on.iter().all(|dep| {
                    run.state(dep)
                        .is_some_and(|s| s.status == ExecutionStatus::Ready)
                })
            })
            .map(|(index, _)| index)
            .take(free)
            .collect()
    }

    /// Worker body: lookup-or-create, then wait for readiness
    async fn work(&self, index: usize, spec: &ResourceSpec, cancel: CancellationToken) -> StepReport {
        let provider = self.provider.as_ref();
        let step = StepExecutor::new(provider, &self.config.retry, &self.events)
            .execute(spec, &cancel)
            .await;

        match &step {
            StepOutcome::Adopted { external_id, .. } => self.events.emit(RunEvent::Adopted {
                id: spec.id.clone(),
                external_id: external_id.clone(),
            }),
            StepOutcome::Created {
                external_id,
                attempts,
            } => self.events.emit(RunEvent::Created {
                id: spec.id.clone(),
                external_id: external_id.clone(),
                attempts: *attempts,
            }),
            StepOutcome::Failed { .. } | StepOutcome::Cancelled { .. } => {}
        }

        let readiness = match step.external_id() {
            Some(external_id) => Some(
                ReadinessPoller::new(provider, self.config.poll_interval)
                    .await_ready(&spec.kind, external_id, spec.readiness_timeout(), &cancel)
                    .await,
            ),
            None => None,
        };

        StepReport {
            index,
            step,
            readiness,
        }
    }

    /// Apply a worker's report to the run. Returns the failure message if the
    /// step failed.
    fn settle(&self, run: &mut Run, spec: &ResourceSpec, report: StepReport) -> Option<String> {
        let state = &mut run.states[report.index];
        let attempts = report.step.attempts();
        let became_ready = report.readiness == Some(Readiness::Ready);

        let error = match report.step {
            StepOutcome::Adopted { external_id, .. } => {
                state.attach(external_id, true, attempts);
                None
            }
            StepOutcome::Created { external_id, .. } => {
                state.attach(external_id, false, attempts);
                None
            }
            StepOutcome::Failed { error, .. } => {
                state.attempts = attempts;
                Some(error)
            }
            StepOutcome::Cancelled { .. } => {
                state.attempts = attempts;
                Some(CloudError::Cancelled(format!(
                    "'{}' was cancelled before it was created",
                    spec.id
                )))
            }
        };

        let error = error.or_else(|| match report.readiness {
            Some(Readiness::Ready) | Some(Readiness::Cancelled) | None => None,
            Some(Readiness::Failed(reason)) => Some(CloudError::ReadinessFailed {
                resource: spec.id.clone(),
                reason,
            }),
            Some(Readiness::TimedOut) => Some(CloudError::ReadinessTimeout {
                resource: spec.id.clone(),
                timeout: spec.readiness_timeout(),
            }),
        });

        if let Some(error) = error {
            let message = error.to_string();
            if let Err(e) = state.mark_failed(&error) {
                tracing::warn!(resource = %spec.id, error = %e, "Could not record failure");
            }
            self.events.emit(RunEvent::Failed {
                id: spec.id.clone(),
                error: message.clone(),
            });
            return Some(message);
        }

        if became_ready {
            if let Err(e) = state.mark_ready(Utc::now()) {
                tracing::warn!(resource = %spec.id, error = %e, "Could not record readiness");
            }
            if let Some(external_id) = state.external_id.clone() {
                self.events.emit(RunEvent::Ready {
                    id: spec.id.clone(),
                    external_id,
                });
            }
        }
        // Readiness cancelled by a halt: the resource stays Creating and is
        // compensated like any other
        None
    }

    async fn finalize(&self, run: &mut Run, halt: Option<String>) {
        let outcome = match halt {
            None if run.all_ready() => RunOutcome::Succeeded,
            halt => {
                let reason = halt.unwrap_or_else(|| "not every resource became ready".to_string());
                tracing::warn!(run_id = %run.run_id, reason = %reason, "Run halted, rolling back");
                run.halt_reason = Some(reason);

                let rollback = RollbackManager::new(self.provider.as_ref(), &self.config.retry, &self.events)
                    .rollback(run)
                    .await;
                let outcome = if rollback.has_leaks() {
                    RunOutcome::FailedWithLeaks
                } else {
                    RunOutcome::Failed
                };
                run.rollback = Some(rollback);
                outcome
            }
        };

        run.outcome = Some(outcome);
        run.finished_at = Some(Utc::now());
        tracing::info!(run_id = %run.run_id, outcome = %outcome, "Run finished");
        self.events.emit(RunEvent::Finished { outcome });
    }
}

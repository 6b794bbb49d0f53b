//! Step executor: idempotent lookup-or-create for one resource

use crate::error::{CloudError, ProviderError};
use crate::events::{EventSink, RunEvent};
use crate::provider::{ExternalId, Provider};
use provflow_core::{ResourceSpec, RetryPolicy};
use tokio_util::sync::CancellationToken;

/// Result of running one step, reported back to the orchestrator
#[derive(Debug)]
pub enum StepOutcome {
    /// A matching resource already existed before this run
    Adopted { external_id: ExternalId, attempts: u32 },
    /// Created by this run
    Created { external_id: ExternalId, attempts: u32 },
    Failed { error: CloudError, attempts: u32 },
    /// Cancelled with nothing to record: either no create was issued, or a
    /// final lookup after a lost create response found nothing
    Cancelled { attempts: u32 },
}

impl StepOutcome {
    pub fn external_id(&self) -> Option<&ExternalId> {
        match self {
            StepOutcome::Adopted { external_id, .. } | StepOutcome::Created { external_id, .. } => {
                Some(external_id)
            }
            StepOutcome::Failed { .. } | StepOutcome::Cancelled { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            StepOutcome::Adopted { attempts, .. }
            | StepOutcome::Created { attempts, .. }
            | StepOutcome::Failed { attempts, .. }
            | StepOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

pub struct StepExecutor<'a> {
    provider: &'a dyn Provider,
    retry: &'a RetryPolicy,
    events: &'a EventSink,
}

impl<'a> StepExecutor<'a> {
    pub fn new(provider: &'a dyn Provider, retry: &'a RetryPolicy, events: &'a EventSink) -> Self {
        Self {
            provider,
            retry,
            events,
        }
    }

    /// Lookup, then create if nothing matched.
    ///
    /// Every attempt starts with a lookup, including retries after a transient
    /// create error: the create may have gone through even though the response
    /// was lost, and the lookup filter is the only idempotency key. A match found
    /// after this run issued a create is reported as `Created`, not `Adopted`.
    pub async fn execute(&self, spec: &ResourceSpec, cancel: &CancellationToken) -> StepOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut create_issued = false;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let attempts = attempt + 1;
            if cancel.is_cancelled() {
                return self.cancelled(spec, create_issued, attempt).await;
            }

            match self.try_once(spec, &mut create_issued).await {
                Ok((external_id, true)) if !create_issued => {
                    return StepOutcome::Adopted {
                        external_id,
                        attempts,
                    };
                }
                Ok((external_id, _)) => {
                    return StepOutcome::Created {
                        external_id,
                        attempts,
                    };
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!(
                        resource = %spec.id,
                        attempt = attempts,
                        error = %error,
                        "Transient provider error"
                    );
                    last_error = Some(error);
                }
                Err(error) => {
                    return StepOutcome::Failed {
                        error: error.into(),
                        attempts,
                    };
                }
            }

            if attempts < max_attempts {
                let delay = self.retry.delay_for_attempt(attempt);
                self.events.emit(RunEvent::Retrying {
                    id: spec.id.clone(),
                    attempt: attempts,
                    delay,
                    error: last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                });
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return self.cancelled(spec, create_issued, attempts).await;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        StepOutcome::Failed {
            error: CloudError::RetriesExhausted {
                resource: spec.id.clone(),
                attempts: max_attempts,
                last_error: last_error
                    .unwrap_or_else(|| ProviderError::transient("no attempt was made")),
            },
            attempts: max_attempts,
        }
    }

    /// A create whose response was lost may still have gone through. Look
    /// once more so that resource is recorded and rolled back.
    async fn cancelled(&self, spec: &ResourceSpec, create_issued: bool, attempts: u32) -> StepOutcome {
        if !create_issued {
            return StepOutcome::Cancelled { attempts };
        }

        match self.provider.lookup(&spec.kind, &spec.lookup_filter).await {
            Ok(Some(external_id)) => {
                tracing::warn!(
                    resource = %spec.id,
                    external_id = %external_id,
                    "Cancelled after an earlier create went through"
                );
                StepOutcome::Created {
                    external_id,
                    attempts,
                }
            }
            Ok(None) | Err(ProviderError::NotFound(_)) => StepOutcome::Cancelled { attempts },
            Err(e) => {
                tracing::warn!(
                    resource = %spec.id,
                    error = %e,
                    "Cancelled; could not confirm whether an earlier create went through"
                );
                StepOutcome::Cancelled { attempts }
            }
        }
    }

    /// One lookup (and create if needed). Returns the id and whether it came from lookup.
    async fn try_once(
        &self,
        spec: &ResourceSpec,
        create_issued: &mut bool,
    ) -> Result<(ExternalId, bool), ProviderError> {
        let found = match self
            .provider
            .lookup(&spec.kind, &spec.lookup_filter)
            .await
        {
            Ok(found) => found,
            Err(ProviderError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        if let Some(external_id) = found {
            tracing::debug!(resource = %spec.id, external_id = %external_id, "Found existing resource");
            return Ok((external_id, true));
        }

        *create_issued = true;
        let external_id = self.provider.create(&spec.kind, &spec.create_params).await?;
        tracing::debug!(resource = %spec.id, external_id = %external_id, "Created resource");
        Ok((external_id, false))
    }
}

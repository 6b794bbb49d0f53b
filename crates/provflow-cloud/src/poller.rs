//! Readiness polling

use crate::error::ProviderError;
use crate::provider::{ExternalId, Provider, ResourceStatus};
use provflow_core::ResourceKind;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Result of waiting for a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Polls `describe` until a resource is ready, failed, timed out, or cancelled
pub struct ReadinessPoller<'a> {
    provider: &'a dyn Provider,
    interval: Duration,
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(provider: &'a dyn Provider, interval: Duration) -> Self {
        Self { provider, interval }
    }

    /// The first `describe` is issued immediately. Transient errors and
    /// `NotFound` (eventual consistency right after create) keep the poll going.
    /// Cancellation and the timeout also interrupt a `describe` in flight.
    pub async fn await_ready(
        &self,
        kind: &ResourceKind,
        external_id: &ExternalId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Readiness {
        // A timeout too large to represent never expires
        let deadline = Instant::now().checked_add(timeout);
        let mut interval = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = sleep_until(deadline) => return Readiness::TimedOut,
                _ = interval.tick() => {}
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = sleep_until(deadline) => return Readiness::TimedOut,
                status = self.provider.describe(kind, external_id) => status,
            };

            match status {
                Ok(ResourceStatus::Ready) => return Readiness::Ready,
                Ok(ResourceStatus::Failed(reason)) => return Readiness::Failed(reason),
                Ok(ResourceStatus::Provisioning) => {
                    tracing::debug!(external_id = %external_id, "Still provisioning");
                }
                Err(ProviderError::Permanent(reason)) => return Readiness::Failed(reason),
                Err(e) => {
                    tracing::debug!(external_id = %external_id, error = %e, "Describe failed, polling again");
                }
            }
        }
    }
}

/// Sleep until `deadline`, or forever when there is none
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderResult;
    use crate::memory::{MemoryProvider, Operation};
    use crate::provider::AuthStatus;
    use async_trait::async_trait;
    use provflow_core::{CreateParams, LookupFilter};

    /// Provider whose `describe` never answers in time
    struct StalledDescribe;

    #[async_trait]
    impl Provider for StalledDescribe {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn check_auth(&self) -> ProviderResult<AuthStatus> {
            Ok(AuthStatus::ok("stalled"))
        }

        async fn lookup(
            &self,
            _kind: &ResourceKind,
            _filter: &LookupFilter,
        ) -> ProviderResult<Option<ExternalId>> {
            Ok(None)
        }

        async fn create(
            &self,
            _kind: &ResourceKind,
            _params: &CreateParams,
        ) -> ProviderResult<ExternalId> {
            Ok(ExternalId::new("stalled-1"))
        }

        async fn describe(
            &self,
            _kind: &ResourceKind,
            _external_id: &ExternalId,
        ) -> ProviderResult<ResourceStatus> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(ResourceStatus::Ready)
        }

        async fn delete(&self, _kind: &ResourceKind, _external_id: &ExternalId) -> ProviderResult<()> {
            Ok(())
        }
    }

    async fn create(provider: &MemoryProvider, kind: ResourceKind) -> ExternalId {
        provider.create(&kind, &serde_json::Map::new()).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_delay() {
        let provider = MemoryProvider::new().with_ready_delay(ResourceKind::Database, Duration::from_secs(12));
        let id = create(&provider, ResourceKind::Database).await;
        let poller = ReadinessPoller::new(&provider, Duration::from_secs(5));

        let start = Instant::now();
        let readiness = poller
            .await_ready(
                &ResourceKind::Database,
                &id,
                Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(readiness, Readiness::Ready);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        // t=0, 5, 10, 15
        assert_eq!(provider.count(Operation::Describe, &ResourceKind::Database), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let provider = MemoryProvider::new().with_ready_delay(ResourceKind::Database, Duration::from_secs(45));
        let id = create(&provider, ResourceKind::Database).await;
        let poller = ReadinessPoller::new(&provider, Duration::from_secs(5));

        let start = Instant::now();
        let readiness = poller
            .await_ready(
                &ResourceKind::Database,
                &id,
                Duration::from_secs(30),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(readiness, Readiness::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status() {
        let provider = MemoryProvider::new();
        provider.fail_readiness(ResourceKind::ComputeInstance, "image not found");
        let id = create(&provider, ResourceKind::ComputeInstance).await;
        let poller = ReadinessPoller::new(&provider, Duration::from_secs(1));

        let readiness = poller
            .await_ready(
                &ResourceKind::ComputeInstance,
                &id,
                Duration::from_secs(30),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(readiness, Readiness::Failed("image not found".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let provider = MemoryProvider::new().with_ready_delay(ResourceKind::Database, Duration::from_secs(600));
        let id = create(&provider, ResourceKind::Database).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let poller = ReadinessPoller::new(&provider, Duration::from_secs(5));
        let start = Instant::now();
        let readiness = poller
            .await_ready(&ResourceKind::Database, &id, Duration::from_secs(60), &cancel)
            .await;

        assert_eq!(readiness, Readiness::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_interrupts_stalled_describe() {
        let poller = ReadinessPoller::new(&StalledDescribe, Duration::from_secs(5));

        let start = Instant::now();
        let readiness = poller
            .await_ready(
                &ResourceKind::Database,
                &ExternalId::new("stalled-1"),
                Duration::from_secs(30),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(readiness, Readiness::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_describe() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let poller = ReadinessPoller::new(&StalledDescribe, Duration::from_secs(5));
        let start = Instant::now();
        let readiness = poller
            .await_ready(
                &ResourceKind::Database,
                &ExternalId::new("stalled-1"),
                Duration::from_secs(30),
                &cancel,
            )
            .await;

        assert_eq!(readiness, Readiness::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let provider = MemoryProvider::new();
        let id = create(&provider, ResourceKind::Network).await;
        let poller = ReadinessPoller::new(&provider, Duration::from_secs(5));

        let readiness = poller
            .await_ready(
                &ResourceKind::Network,
                &id,
                Duration::from_secs(u64::MAX),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(readiness, Readiness::Ready);
    }
}

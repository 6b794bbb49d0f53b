//! In-memory provider
//!
//! Simulates a cloud account: resources get sequential ids, become ready after
//! a configurable delay (measured on the tokio clock, so paused-time tests are
//! deterministic) and every call is recorded. Used by `prov up --provider memory`
//! and by the test suites.

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{AuthStatus, ExternalId, Provider, ResourceStatus};
use async_trait::async_trait;
use provflow_core::{CreateParams, LookupFilter, ResourceKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Provider operation, for call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Lookup,
    Create,
    Describe,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub external_id: Option<ExternalId>,
}

#[derive(Debug)]
struct StoredResource {
    kind: ResourceKind,
    attributes: BTreeMap<String, String>,
    ready_at: Instant,
}

/// Scripted failure: `remaining` of `None` means every call fails
#[derive(Debug, Clone)]
struct Fault {
    error: ProviderError,
    remaining: Option<u32>,
    /// Perform the operation, then report the error anyway
    after_effect: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    resources: BTreeMap<ExternalId, StoredResource>,
    faults: HashMap<(Operation, ResourceKind), Fault>,
    ready_delays: HashMap<ResourceKind, Duration>,
    failing_readiness: HashMap<ResourceKind, String>,
    calls: Vec<Call>,
    deleted: Vec<ExternalId>,
    auth_error: Option<String>,
}

impl Inner {
    /// Consume a scripted fault for this operation, if one is armed
    fn take_fault(&mut self, operation: Operation, kind: &ResourceKind) -> Option<Fault> {
        let key = (operation, kind.clone());
        let fault = self.faults.get_mut(&key)?;
        let fired = fault.clone();
        let exhausted = match &mut fault.remaining {
            None => false,
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        };
        if exhausted {
            self.faults.remove(&key);
        }
        Some(fired)
    }

    fn record(&mut self, operation: Operation, kind: &ResourceKind, external_id: Option<&ExternalId>) {
        self.calls.push(Call {
            operation,
            kind: kind.clone(),
            external_id: external_id.cloned(),
        });
    }

    fn insert(&mut self, kind: &ResourceKind, attributes: BTreeMap<String, String>) -> ExternalId {
        self.next_id += 1;
        let external_id = ExternalId::new(format!("{}-{:04}", kind.as_str(), self.next_id));
        let delay = self.ready_delays.get(kind).copied().unwrap_or_default();
        self.resources.insert(
            external_id.clone(),
            StoredResource {
                kind: kind.clone(),
                attributes,
                ready_at: Instant::now() + delay,
            },
        );
        external_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from the others
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resources of this kind take `delay` to become ready
    pub fn with_ready_delay(self, kind: ResourceKind, delay: Duration) -> Self {
        self.lock().ready_delays.insert(kind, delay);
        self
    }

    /// Pre-existing resource, as if created outside of provflow
    pub fn seed<I, K, V>(&self, kind: ResourceKind, attributes: I) -> ExternalId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut inner = self.lock();
        let external_id = inner.insert(&kind, attributes);
        if let Some(resource) = inner.resources.get_mut(&external_id) {
            resource.ready_at = Instant::now();
        }
        external_id
    }

    fn arm(&self, operation: Operation, kind: ResourceKind, fault: Fault) {
        self.lock().faults.insert((operation, kind), fault);
    }

    /// Every create of this kind fails
    pub fn fail_create(&self, kind: ResourceKind, error: ProviderError) {
        self.arm(
            Operation::Create,
            kind,
            Fault {
                error,
                remaining: None,
                after_effect: false,
            },
        );
    }

    /// The next `times` creates of this kind fail
    pub fn fail_create_times(&self, kind: ResourceKind, times: u32, error: ProviderError) {
        self.arm(
            Operation::Create,
            kind,
            Fault {
                error,
                remaining: Some(times),
                after_effect: false,
            },
        );
    }

    /// The next `times` creates of this kind succeed but report a timeout
    pub fn lose_create_response(&self, kind: ResourceKind, times: u32) {
        self.arm(
            Operation::Create,
            kind,
            Fault {
                error: ProviderError::transient("response lost"),
                remaining: Some(times),
                after_effect: true,
            },
        );
    }

    pub fn fail_lookup_times(&self, kind: ResourceKind, times: u32, error: ProviderError) {
        self.arm(
            Operation::Lookup,
            kind,
            Fault {
                error,
                remaining: Some(times),
                after_effect: false,
            },
        );
    }

    /// Every delete of this kind fails
    pub fn fail_delete(&self, kind: ResourceKind, error: ProviderError) {
        self.arm(
            Operation::Delete,
            kind,
            Fault {
                error,
                remaining: None,
                after_effect: false,
            },
        );
    }

    pub fn fail_delete_times(&self, kind: ResourceKind, times: u32, error: ProviderError) {
        self.arm(
            Operation::Delete,
            kind,
            Fault {
                error,
                remaining: Some(times),
                after_effect: false,
            },
        );
    }

    /// Resources of this kind end up in a failed state
    pub fn fail_readiness(&self, kind: ResourceKind, reason: impl Into<String>) {
        self.lock().failing_readiness.insert(kind, reason.into());
    }

    pub fn fail_auth(&self, error: impl Into<String>) {
        self.lock().auth_error = Some(error.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: Operation, kind: &ResourceKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation && &c.kind == kind)
            .count()
    }

    /// External ids in the order their deletes succeeded
    pub fn deleted_order(&self) -> Vec<ExternalId> {
        self.lock().deleted.clone()
    }

    pub fn exists(&self, external_id: &ExternalId) -> bool {
        self.lock().resources.contains_key(external_id)
    }

    pub fn live_resources(&self) -> usize {
        self.lock().resources.len()
    }
}

fn attribute_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> ProviderResult<AuthStatus> {
        Ok(match &self.lock().auth_error {
            Some(error) => AuthStatus::failed(error.clone()),
            None => AuthStatus::ok("in-memory account"),
        })
    }

    async fn lookup(
        &self,
        kind: &ResourceKind,
        filter: &LookupFilter,
    ) -> ProviderResult<Option<ExternalId>> {
        let mut inner = self.lock();
        inner.record(Operation::Lookup, kind, None);
        if let Some(fault) = inner.take_fault(Operation::Lookup, kind) {
            return Err(fault.error);
        }

        let found = inner
            .resources
            .iter()
            .find(|(_, r)| {
                &r.kind == kind
                    && filter
                        .iter()
                        .all(|(k, v)| r.attributes.get(k).is_some_and(|a| a == v))
            })
            .map(|(id, _)| id.clone());
        Ok(found)
    }

    async fn create(&self, kind: &ResourceKind, params: &CreateParams) -> ProviderResult<ExternalId> {
        let mut inner = self.lock();
        inner.record(Operation::Create, kind, None);
        let fault = inner.take_fault(Operation::Create, kind);
        if let Some(Fault {
            error,
            after_effect: false,
            ..
        }) = &fault
        {
            return Err(error.clone());
        }

        let attributes = params
            .iter()
            .map(|(k, v)| (k.clone(), attribute_string(v)))
            .collect();
        let external_id = inner.insert(kind, attributes);
        match fault {
            Some(fault) => Err(fault.error),
            None => Ok(external_id),
        }
    }

    async fn describe(
        &self,
        kind: &ResourceKind,
        external_id: &ExternalId,
    ) -> ProviderResult<ResourceStatus> {
        let mut inner = self.lock();
        inner.record(Operation::Describe, kind, Some(external_id));
        if let Some(fault) = inner.take_fault(Operation::Describe, kind) {
            return Err(fault.error);
        }

        let Some(resource) = inner.resources.get(external_id) else {
            return Err(ProviderError::NotFound(external_id.to_string()));
        };
        if let Some(reason) = inner.failing_readiness.get(kind) {
            return Ok(ResourceStatus::Failed(reason.clone()));
        }
        if Instant::now() >= resource.ready_at {
            Ok(ResourceStatus::Ready)
        } else {
            Ok(ResourceStatus::Provisioning)
        }
    }

    async fn delete(&self, kind: &ResourceKind, external_id: &ExternalId) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.record(Operation::Delete, kind, Some(external_id));
        if let Some(fault) = inner.take_fault(Operation::Delete, kind) {
            return Err(fault.error);
        }

        if inner.resources.remove(external_id).is_none() {
            return Err(ProviderError::NotFound(external_id.to_string()));
        }
        inner.deleted.push(external_id.clone());
        Ok(())
    }
}
